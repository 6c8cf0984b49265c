pub mod device_profile;
pub mod signature_utils;
