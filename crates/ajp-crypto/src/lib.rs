//! Login key material for the AJP14 handshake
//!
//! An AJP14 backend proves nothing and trusts nothing until the web server
//! shows it knows the shared secret. The backend sends an [`EntropySeed`];
//! the web server answers with the [`ComputedKey`] derived from seed and
//! secret. A fresh seed is used for every connection.
//!
//! ```
//! use ajp_crypto::{ComputedKey, EntropySeed};
//!
//! let seed = EntropySeed::from_hex("0123456789ABCDEF0123456789ABCDEF").unwrap();
//! let key = ComputedKey::compute(&seed, "s3cret").unwrap();
//! assert_eq!(key.to_string(), "D6EBE5A262B888CAD76F2F2C382BB42C");
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod login_key;

pub use error::{CryptoError, Result};
pub use login_key::{ComputedKey, EntropySeed, KEY_LEN};
