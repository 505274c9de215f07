//! Sample conditioning

mod dc_removal;

pub use dc_removal::{DcRemovalFilter, ALPHA};
