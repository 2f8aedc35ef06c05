pub mod audio;
pub mod packet_queue;
pub mod video;

pub use packet_queue::{PacketEntry, PacketQueue};
