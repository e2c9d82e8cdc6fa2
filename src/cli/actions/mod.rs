pub mod server;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        face_oracle_url: String,
        face_tolerance: f64,
        max_attempts: u32,
        lockout_minutes: i64,
    },
}
