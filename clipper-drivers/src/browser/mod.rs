pub mod behavioral;
pub mod driver;
pub mod fingerprint;
pub mod stealth;
