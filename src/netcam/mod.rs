pub mod handler;
pub mod packet_ring;
