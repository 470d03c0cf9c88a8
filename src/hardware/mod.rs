//! Hardware Collaborators
//!
//! Capability traits consumed by the controller core, plus their
//! implementations: the XPS TCP link, a directory-backed file transport and
//! the simulated instrument.

pub mod capabilities;
pub mod local_transport;
pub mod mock;
pub mod xps;

pub use capabilities::{
    AuxiliaryDevice, ConfigTransport, GatheringChannel, GatheringQuantity, GroupMethod, LinkFault,
    LinkResult, MotionLink, MoveMode, SGammaProfile,
};
pub use local_transport::LocalTransport;
pub use xps::XpsLink;
