use super::{ConnectOptions, Engine};
use crate::event::parse_property;

pub fn parse_engine(s: &str) -> Option<Engine> {
    match s.to_lowercase().as_str() {
        "mqtt" => Some(Engine::Mqtt),
        #[cfg(any(test, feature = "transport-mock"))]
        "mock" => Some(Engine::Mock),
        _ => None,
    }
}

pub fn parse_connect_kv(pairs: &[String]) -> ConnectOptions {
    let mut opts = ConnectOptions::default();
    for p in pairs {
        if let Some((k, v)) = parse_property(p) {
            opts.params.insert(k.to_string(), v.to_string());
        }
    }
    opts
}
