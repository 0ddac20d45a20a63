//! # Core Protocol Components
//!
//! Low-level packet framing and binary field serialization.
//!
//! ## Components
//! - **Codec**: Tokio codec for the outer `length + magic + payload` frame
//! - **Serializer**: declarative fixed-width field pack/unpack
//!
//! ## Wire Format
//! ```text
//! [Length(4, LE)] [Magic(4, LE)] [Payload(N)]
//! ```

pub mod codec;
pub mod serializer;
