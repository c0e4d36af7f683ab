use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment, parse_f64,
    parse_u16, parse_u32, parse_u64, parse_usize,
};
use super::types::{
    AiSettings, ApiSettings, ConfigError, CorsSettings, DatabaseSettings, GradingSettings,
    NotificationSettings, ProviderSettings, RedisSettings, RuntimeSettings, S3Settings,
    SecuritySettings, ServerHost, ServerPort, ServerSettings, Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("SPEAKWISE_HOST", "0.0.0.0");
        let port = env_or_default("SPEAKWISE_PORT", "8000");

        let environment = parse_environment(
            env_optional("SPEAKWISE_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("SPEAKWISE_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Speakwise Grading API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        // Tokens are minted by the identity service; the shared key must be
        // configured outside development.
        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None if strict_config => return Err(ConfigError::MissingSecret("SECRET_KEY")),
            None => ephemeral_secret_key(),
        };
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "speakwise");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "speakwise_db");
        let database_url = env_optional("DATABASE_URL");

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let speech = provider_from_env(
            "speech",
            "SPEECH",
            "https://api.openai.com/v1",
            "whisper-1",
            "60",
        )?;
        let multimodal = provider_from_env(
            "multimodal",
            "MULTIMODAL",
            "https://generativelanguage.googleapis.com/v1beta/openai",
            "gemini-2.0-flash",
            "90",
        )?;
        let primary_evaluator =
            provider_from_env("primary", "OPENAI", "https://api.openai.com/v1", "gpt-4o", "120")?;
        let secondary_evaluator = provider_from_env(
            "secondary",
            "FALLBACK_AI",
            "https://generativelanguage.googleapis.com/v1beta/openai",
            "gemini-2.0-flash",
            "120",
        )?;
        let max_tokens = parse_u32("AI_MAX_TOKENS", env_or_default("AI_MAX_TOKENS", "2000"))?;
        let temperature = parse_f64("AI_TEMPERATURE", env_or_default("AI_TEMPERATURE", "0.2"))?;

        let review_window_hours = parse_u64(
            "GRADING_REVIEW_WINDOW_HOURS",
            env_or_default("GRADING_REVIEW_WINDOW_HOURS", "48"),
        )?;
        let min_audio_bytes = parse_usize(
            "GRADING_MIN_AUDIO_BYTES",
            env_or_default("GRADING_MIN_AUDIO_BYTES", "1024"),
        )?;
        let fallback_score =
            parse_u32("GRADING_FALLBACK_SCORE", env_or_default("GRADING_FALLBACK_SCORE", "35"))?;
        let max_images =
            parse_usize("GRADING_MAX_IMAGES", env_or_default("GRADING_MAX_IMAGES", "3"))?;
        let transcription_attempts = parse_u32(
            "TRANSCRIPTION_ATTEMPTS",
            env_or_default("TRANSCRIPTION_ATTEMPTS", "3"),
        )?;
        let evaluation_attempts =
            parse_u32("EVALUATION_ATTEMPTS", env_or_default("EVALUATION_ATTEMPTS", "2"))?;
        let provider_backoff_ms =
            parse_u64("PROVIDER_BACKOFF_MS", env_or_default("PROVIDER_BACKOFF_MS", "500"))?;
        let stale_after_seconds = parse_u64(
            "GRADING_STALE_AFTER_SECONDS",
            env_or_default("GRADING_STALE_AFTER_SECONDS", "900"),
        )?;
        let submission_rate_limit_per_minute = parse_u64(
            "SUBMISSION_RATE_LIMIT_PER_MINUTE",
            env_or_default("SUBMISSION_RATE_LIMIT_PER_MINUTE", "20"),
        )?;
        let max_audio_size_mb =
            parse_u64("MAX_AUDIO_SIZE_MB", env_or_default("MAX_AUDIO_SIZE_MB", "25"))?;

        let s3_endpoint = env_or_default("S3_ENDPOINT", "https://storage.yandexcloud.net");
        let s3_access_key = env_or_default("S3_ACCESS_KEY", "");
        let s3_secret_key = env_or_default("S3_SECRET_KEY", "");
        let s3_bucket = env_or_default("S3_BUCKET", "speakwise-submissions");
        let s3_region = env_or_default("S3_REGION", "ru-central1");

        let webhook_url = env_optional("NOTIFY_WEBHOOK_URL");
        let notify_timeout_seconds =
            parse_u64("NOTIFY_TIMEOUT_SECONDS", env_or_default("NOTIFY_TIMEOUT_SECONDS", "10"))?;

        let log_level = env_or_default("SPEAKWISE_LOG_LEVEL", "info");
        let json = env_optional("SPEAKWISE_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            ai: AiSettings {
                speech,
                multimodal,
                primary_evaluator,
                secondary_evaluator,
                max_tokens,
                temperature,
            },
            grading: GradingSettings {
                review_window_hours,
                min_audio_bytes,
                fallback_score,
                max_images,
                transcription_attempts,
                evaluation_attempts,
                provider_backoff_ms,
                stale_after_seconds,
                submission_rate_limit_per_minute,
                max_audio_size_mb,
            },
            s3: S3Settings {
                endpoint: s3_endpoint,
                access_key: s3_access_key,
                secret_key: s3_secret_key,
                bucket: s3_bucket,
                region: s3_region,
            },
            notifications: NotificationSettings {
                webhook_url,
                timeout_seconds: notify_timeout_seconds,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn grading(&self) -> &GradingSettings {
        &self.grading
    }

    pub(crate) fn s3(&self) -> &S3Settings {
        &self.s3
    }

    pub(crate) fn notifications(&self) -> &NotificationSettings {
        &self.notifications
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.grading.fallback_score > 100 {
            return Err(ConfigError::InvalidValue {
                field: "GRADING_FALLBACK_SCORE",
                value: self.grading.fallback_score.to_string(),
            });
        }

        if self.grading.transcription_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "TRANSCRIPTION_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        if self.grading.evaluation_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "EVALUATION_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        if self.grading.review_window_hours == 0 {
            return Err(ConfigError::InvalidValue {
                field: "GRADING_REVIEW_WINDOW_HOURS",
                value: "0".to_string(),
            });
        }

        if !(0.0..=2.0).contains(&self.ai.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "AI_TEMPERATURE",
                value: self.ai.temperature.to_string(),
            });
        }

        if self.security.algorithm != "HS256" {
            return Err(ConfigError::InvalidValue {
                field: "ALGORITHM",
                value: self.security.algorithm.clone(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if !self.ai.primary_evaluator.is_configured() {
            return Err(ConfigError::MissingSecret("OPENAI_API_KEY"));
        }
        if !self.ai.speech.is_configured() && !self.ai.multimodal.is_configured() {
            return Err(ConfigError::MissingSecret("SPEECH_API_KEY/MULTIMODAL_API_KEY"));
        }
        if self.s3.access_key.is_empty() || self.s3.secret_key.is_empty() {
            return Err(ConfigError::MissingSecret("S3_ACCESS_KEY/S3_SECRET_KEY"));
        }

        Ok(())
    }
}

fn provider_from_env(
    name: &str,
    prefix: &str,
    default_base_url: &str,
    default_model: &str,
    default_timeout: &str,
) -> Result<ProviderSettings, ConfigError> {
    let timeout_key = match prefix {
        "SPEECH" => "SPEECH_TIMEOUT_SECONDS",
        "MULTIMODAL" => "MULTIMODAL_TIMEOUT_SECONDS",
        "OPENAI" => "AI_REQUEST_TIMEOUT",
        _ => "FALLBACK_AI_TIMEOUT_SECONDS",
    };

    Ok(ProviderSettings {
        name: name.to_string(),
        api_key: env_or_default(&format!("{prefix}_API_KEY"), ""),
        base_url: env_or_default(&format!("{prefix}_BASE_URL"), default_base_url)
            .trim_end_matches('/')
            .to_string(),
        model: if prefix == "OPENAI" {
            env_or_default("AI_MODEL", default_model)
        } else {
            env_or_default(&format!("{prefix}_MODEL"), default_model)
        },
        timeout_seconds: parse_u64(timeout_key, env_or_default(timeout_key, default_timeout))?,
    })
}

fn ephemeral_secret_key() -> String {
    tracing::warn!("SECRET_KEY is not set; using an ephemeral key, issued tokens will not verify");
    let mut bytes = [0u8; 64];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
