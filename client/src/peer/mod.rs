mod client;

pub use client::{ClientPeer, ClientPeerStats};
