use std::time::Duration;

pub trait Configuration: Clone + Send + Sync + 'static {
    fn port(&self) -> u16;
    fn database_url(&self) -> Option<String>;
    fn pool_size(&self) -> u32;
    fn admin_password(&self) -> Option<String>;
    fn keep_alive_interval(&self) -> Duration;
    fn seed_examples(&self) -> bool;
}
