pub mod demo;
pub mod net;
pub mod p4;
pub mod sim;
pub mod topo;

#[cfg(test)]
mod test;
