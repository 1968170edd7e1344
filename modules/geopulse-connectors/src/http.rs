// Shared HTTP client construction for connectors.

use std::time::Duration;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/91.0.4472.124 Safari/537.36";

pub(crate) fn client(connect_secs: u64, read_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(connect_secs))
        .timeout(Duration::from_secs(read_secs))
        .user_agent(USER_AGENT)
        .build()
        .expect("Failed to build connector HTTP client")
}
