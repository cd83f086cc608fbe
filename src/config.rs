//! Tunable timings and limits, loaded from the environment.

use std::time::Duration;

/// Timings and limits for games, rounds, the public loop and image generation
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub label_duration: Duration,
    pub guess_duration: Duration,
    pub reveal_duration: Duration,
    /// Fallback auto-advance after the host leaves the lobby
    pub generate_duration: Duration,
    /// Upper bound for an image generation before the watchdog fails it
    pub image_timeout: Duration,
    pub public_guess_duration: Duration,
    pub public_reveal_duration: Duration,
    /// How often the background ticker pokes the public game
    pub public_tick: Duration,
    pub max_players: usize,
    /// Option cap for rounds that are not part of a game
    pub max_options: usize,
    pub max_prompt_length: usize,
    /// Number of terminal submissions the health read model looks at
    pub health_sample: usize,
    pub image_size: String,
    pub port: u16,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            label_duration: Duration::from_secs(30),
            guess_duration: Duration::from_secs(30),
            reveal_duration: Duration::from_secs(30),
            generate_duration: Duration::from_secs(120),
            image_timeout: Duration::from_secs(30),
            public_guess_duration: Duration::from_secs(15),
            public_reveal_duration: Duration::from_secs(10),
            public_tick: Duration::from_secs(10),
            max_players: 8,
            max_options: 8,
            max_prompt_length: 100,
            health_sample: 5,
            image_size: "512x512".to_string(),
            port: 6574,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}

impl GameConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let image_size = std::env::var("IMAGE_SIZE")
            .ok()
            .and_then(|size| {
                let trimmed = size.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or(defaults.image_size);

        Self {
            label_duration: env_millis("LABEL_MS").unwrap_or(defaults.label_duration),
            guess_duration: env_millis("GUESS_MS").unwrap_or(defaults.guess_duration),
            reveal_duration: env_millis("REVEAL_MS").unwrap_or(defaults.reveal_duration),
            generate_duration: env_millis("GENERATE_MS").unwrap_or(defaults.generate_duration),
            image_timeout: env_millis("IMAGE_TIMEOUT_MS").unwrap_or(defaults.image_timeout),
            public_guess_duration: env_millis("PUBLIC_GUESS_MS")
                .unwrap_or(defaults.public_guess_duration),
            public_reveal_duration: env_millis("PUBLIC_REVEAL_MS")
                .unwrap_or(defaults.public_reveal_duration),
            public_tick: env_millis("PUBLIC_TICK_MS").unwrap_or(defaults.public_tick),
            max_players: env_parse("MAX_PLAYERS").unwrap_or(defaults.max_players),
            max_options: env_parse("MAX_OPTIONS").unwrap_or(defaults.max_options),
            max_prompt_length: env_parse("MAX_PROMPT_LENGTH")
                .unwrap_or(defaults.max_prompt_length),
            health_sample: env_parse("HEALTH_SAMPLE").unwrap_or(defaults.health_sample),
            image_size,
            port: env_parse("PORT").unwrap_or(defaults.port),
        }
    }
}
