pub mod device;
pub mod error;
pub mod otp;
pub mod password;
pub mod token;

pub use device::device_id;
pub use error::CryptoError;
pub use otp::{generate_default_otp, generate_otp, verify_otp};
pub use password::{hash_password, verify_password};
pub use token::{
    generate_refresh_secret, hash_refresh_secret, sign_access_token, verify_access_token,
    AccessTokenClaims,
};
