#[derive(Clone, Debug)]
pub struct MumbleConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub access_tokens: Vec<String>,
    pub accept_invalid_certs: bool,
}

pub const DEFAULT_PORT: u16 = 64738;

impl MumbleConfig {
    pub fn new(server: String, port: u16, username: String) -> Self {
        Self {
            server,
            port,
            username,
            password: None,
            access_tokens: Vec::new(),
            accept_invalid_certs: false,
        }
    }
}
