//! Device fingerprinting, per spec §6: MD5 hex of
//! `"{userAgent or 'unknown'}:{ipAddress or 'unknown'}"`, used when the
//! client doesn't supply its own device id.

use md5::{Digest, Md5};

pub fn device_id(user_agent: Option<&str>, ip: Option<&str>) -> String {
    let ua = user_agent.unwrap_or("unknown");
    let ip = ip.unwrap_or("unknown");
    let input = format!("{ua}:{ip}");
    hex::encode(Md5::digest(input.as_bytes()))
}
