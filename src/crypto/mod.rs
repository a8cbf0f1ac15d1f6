pub mod signatures;

pub use signatures::SignatureManager;
