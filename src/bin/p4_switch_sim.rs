//! P4 交换机 star 拓扑仿真
//!
//! 一个 P4 交换机连接 N 个主机，从 h0 向 `--dst` 发一条 UDP 流。

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use p4sim_rs::demo::{InjectFlow, basic_pipeline, basic_program, star_commands};
use p4sim_rs::net::{NetWorld, Stats};
use p4sim_rs::p4::PipelineConfig;
use p4sim_rs::p4::PipelineContext;
use p4sim_rs::p4::runtime::ProgramSpec;
use p4sim_rs::sim::{SimTime, Simulator};
use p4sim_rs::topo::{StarOpts, build_star, star_host_ip};
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "p4_switch_sim", about = "P4 交换机仿真：star 拓扑，h0 -> dst 单流发包")]
struct Args {
    /// 程序描述 JSON（缺省为内置 basic_switch）
    #[arg(long)]
    program: Option<PathBuf>,
    /// 控制面命令文件（缺省为 star 拓扑的默认表项和组播组）
    #[arg(long)]
    commands: Option<PathBuf>,
    #[arg(long, default_value_t = 4)]
    hosts: usize,
    #[arg(long, default_value_t = 100)]
    pkts: u64,
    /// 整帧字节数
    #[arg(long, default_value_t = 1000)]
    pkt_bytes: usize,
    /// 两个帧注入间隔（微秒）
    #[arg(long, default_value_t = 10)]
    gap_us: u64,
    #[arg(long, default_value_t = 10)]
    link_gbps: u64,
    /// 单向链路传播时延（微秒）
    #[arg(long, default_value_t = 2)]
    link_latency_us: u64,
    /// 目的地址（缺省为最后一个主机）
    #[arg(long)]
    dst: Option<IpAddr>,
    /// 主机使用 IPv6 地址
    #[arg(long, default_value_t = false)]
    ipv6: bool,
    /// 仿真运行到多少毫秒
    #[arg(long, default_value_t = 50)]
    until_ms: u64,
    /// 把运行摘要写成 JSON
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct Summary {
    now_ns: u64,
    executed_events: u64,
    pipeline_packets: u64,
    sent_frames: u64,
    avg_latency_ns: u64,
    stats: Stats,
}

fn run(args: &Args) -> Result<Summary, String> {
    if args.hosts < 2 {
        return Err(format!("--hosts must be at least 2, got {}", args.hosts));
    }

    let program = match &args.program {
        Some(path) => ProgramSpec::load(path),
        None => basic_program(),
    }
    .map_err(|e| e.to_string())?;

    let ctx = Arc::new(PipelineContext::new());
    let mut pipeline = basic_pipeline(Arc::clone(&ctx), program, PipelineConfig::named("s0"))
        .map_err(|e| e.to_string())?;

    let host_ips: Vec<IpAddr> = (0..args.hosts)
        .map(|i| star_host_ip(i, args.ipv6))
        .collect();
    let commands = match &args.commands {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?,
        None => star_commands(&host_ips),
    };
    pipeline.run_commands(&commands).map_err(|e| e.to_string())?;

    let dst = args.dst.unwrap_or(host_ips[args.hosts - 1]);
    if dst.is_ipv4() == args.ipv6 {
        return Err(format!("--dst {dst} does not match the host address family"));
    }

    let mut sim = Simulator::default();
    let mut world = NetWorld::default();
    let opts = StarOpts {
        hosts: args.hosts,
        link_gbps: args.link_gbps,
        link_latency: SimTime::from_micros(args.link_latency_us),
        ipv6: args.ipv6,
    };
    let star = build_star(&mut world, pipeline, &opts);

    sim.schedule(
        SimTime::ZERO,
        InjectFlow {
            flow_id: 1,
            src: star.hosts[0],
            dst_ip: dst,
            pkt_bytes: args.pkt_bytes,
            remaining: args.pkts,
            gap: SimTime::from_micros(args.gap_us),
        },
    );

    info!(hosts = args.hosts, pkts = args.pkts, dst = %dst, "▶️ 仿真开始");
    sim.run_until(SimTime::from_millis(args.until_ms), &mut world);
    info!(now = %sim.now(), "✅ 仿真完成");

    let stats = world.net.stats.clone();
    let sent_frames = stats.host("h0").map_or(0, |h| h.tx_frames);
    Ok(Summary {
        now_ns: sim.now().as_nanos(),
        executed_events: sim.executed(),
        pipeline_packets: ctx.packets_allocated(),
        sent_frames,
        avg_latency_ns: stats.avg_latency_ns(),
        stats,
    })
}

fn main() {
    // 初始化 tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();

    let summary = match run(&args) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "仿真配置错误");
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    println!(
        "done @ {}, sent_frames={}, delivered_frames={}, delivered_bytes={}, dropped_no_port={}",
        SimTime(summary.now_ns),
        summary.sent_frames,
        summary.stats.delivered_frames,
        summary.stats.delivered_bytes,
        summary.stats.dropped_no_port
    );

    if let Some(path) = &args.summary_json {
        let written = serde_json::to_string_pretty(&summary)
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
        if let Err(e) = written {
            eprintln!("error: failed to write {}: {e}", path.display());
            std::process::exit(1);
        }
        eprintln!("wrote summary to {}", path.display());
    }
}
