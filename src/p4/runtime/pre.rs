//! 包复制引擎（simple PRE）
//!
//! 组播组 -> 有序的节点列表；节点 = replication id + 端口集合。
//! 复制顺序：按节点关联到组的先后，节点内按端口号升序。

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::p4::error::RuntimeError;

use super::Replica;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McNode {
    pub rid: u16,
    pub ports: BTreeSet<u32>,
}

#[derive(Debug, Default)]
pub struct SimplePre {
    groups: BTreeMap<u32, Vec<u32>>,
    nodes: BTreeMap<u32, McNode>,
    next_node: u32,
}

impl SimplePre {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_group(&mut self, mgid: u32) -> Result<(), RuntimeError> {
        if self.groups.contains_key(&mgid) {
            return Err(RuntimeError::DuplicateGroup(mgid));
        }
        self.groups.insert(mgid, Vec::new());
        Ok(())
    }

    pub fn destroy_group(&mut self, mgid: u32) -> Result<(), RuntimeError> {
        self.groups
            .remove(&mgid)
            .map(|_| ())
            .ok_or(RuntimeError::UnknownGroup(mgid))
    }

    /// 创建节点，返回节点 handle
    pub fn create_node(&mut self, rid: u16, ports: impl IntoIterator<Item = u32>) -> u32 {
        let handle = self.next_node;
        self.next_node += 1;
        self.nodes.insert(
            handle,
            McNode {
                rid,
                ports: ports.into_iter().collect(),
            },
        );
        handle
    }

    pub fn update_node(
        &mut self,
        handle: u32,
        ports: impl IntoIterator<Item = u32>,
    ) -> Result<(), RuntimeError> {
        let node = self
            .nodes
            .get_mut(&handle)
            .ok_or(RuntimeError::UnknownNode(handle))?;
        node.ports = ports.into_iter().collect();
        Ok(())
    }

    /// 删除节点，同时从所有组中解除关联
    pub fn destroy_node(&mut self, handle: u32) -> Result<(), RuntimeError> {
        self.nodes
            .remove(&handle)
            .ok_or(RuntimeError::UnknownNode(handle))?;
        for members in self.groups.values_mut() {
            members.retain(|&h| h != handle);
        }
        Ok(())
    }

    pub fn associate(&mut self, mgid: u32, handle: u32) -> Result<(), RuntimeError> {
        if !self.nodes.contains_key(&handle) {
            return Err(RuntimeError::UnknownNode(handle));
        }
        let members = self
            .groups
            .get_mut(&mgid)
            .ok_or(RuntimeError::UnknownGroup(mgid))?;
        if members.contains(&handle) {
            return Err(RuntimeError::AlreadyAssociated { mgid, node: handle });
        }
        members.push(handle);
        Ok(())
    }

    pub fn dissociate(&mut self, mgid: u32, handle: u32) -> Result<(), RuntimeError> {
        let members = self
            .groups
            .get_mut(&mgid)
            .ok_or(RuntimeError::UnknownGroup(mgid))?;
        let before = members.len();
        members.retain(|&h| h != handle);
        if members.len() == before {
            return Err(RuntimeError::NotAssociated { mgid, node: handle });
        }
        Ok(())
    }

    pub fn node(&self, handle: u32) -> Option<&McNode> {
        self.nodes.get(&handle)
    }

    /// 组播组的副本列表；未知的组返回空
    pub fn replicate(&self, mgid: u32) -> Vec<Replica> {
        let Some(members) = self.groups.get(&mgid) else {
            debug!(mgid, "组播组不存在，不产生副本");
            return Vec::new();
        };
        members
            .iter()
            .filter_map(|h| self.nodes.get(h))
            .flat_map(|node| {
                node.ports.iter().map(move |&egress_port| Replica {
                    egress_port,
                    rid: node.rid,
                })
            })
            .collect()
    }
}
