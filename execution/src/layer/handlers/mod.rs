use super::*;

mod cyberlink;
mod transfer;

pub(in crate::layer) use cyberlink::handle_cyberlink;
pub(in crate::layer) use transfer::handle_send;
