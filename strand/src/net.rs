//! Network sources usable as waitables.

pub mod socket;

pub use socket::UdpSocket;
