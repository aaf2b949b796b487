//! Services wrapping external collaborators

pub mod epg_grabber;

pub use epg_grabber::EpgGrabber;
