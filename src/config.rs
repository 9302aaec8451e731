use rand::Rng;

pub struct Config {
    pub port: u16,
    /// The one token the gateway accepts. Everything else closes with 4004.
    pub token: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            // Defaults to a random high port; the harness that points the
            // client at this mock reads the bound port off stderr anyway.
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or_else(|| rand::thread_rng().gen_range(10_000..30_000)),
            token: std::env::var("POWERUNIT_TOKEN")
                .unwrap_or_else(|_| "powerunit".to_string()),
        }
    }
}
