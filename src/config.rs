use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    pub classifier: ClassifierConfig,
    pub detector: DetectorConfig,
    #[serde(default)]
    pub annotation: AnnotationConfig,
    #[serde(default)]
    pub dev: DevConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Timing of the background worker and of the request-side rendezvous.
#[derive(Clone, Deserialize, Debug)]
pub struct RecognitionConfig {
    #[serde(default = "default_worker_fps")]
    pub worker_fps: u64,
    #[serde(default = "default_response_wait_ms")]
    pub response_wait_ms: u64,
}

fn default_worker_fps() -> u64 {
    30
}

fn default_response_wait_ms() -> u64 {
    50
}

fn fps_to_delay_ms(fps: u64) -> u64 {
    (1000.0 / fps.max(1) as f64).round() as u64
}

impl RecognitionConfig {
    pub fn get_worker_delay_ms(&self) -> u64 {
        fps_to_delay_ms(self.worker_fps)
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            worker_fps: default_worker_fps(),
            response_wait_ms: default_response_wait_ms(),
        }
    }
}

pub trait Validatable {
    fn get_path(&self) -> PathBuf;

    fn validate(&self) -> Result<(), String> {
        if !self.get_path().exists() {
            return Err(format!("File not found: {:?}", self.get_path()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    pub model_dir: PathBuf,
    pub onnx_file: String,
    /// Maps integer class ids to labels. Not needed when the model emits string labels.
    #[serde(default)]
    pub labels_file: Option<String>,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

impl ClassifierConfig {
    pub fn get_labels_path(&self) -> Option<PathBuf> {
        self.labels_file
            .as_ref()
            .map(|file| self.model_dir.join(file))
    }
}

impl Validatable for ClassifierConfig {
    fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectorConfig {
    pub model_dir: PathBuf,
    pub onnx_file: String,
    #[serde(default = "default_detector_input_size")]
    pub input_size: u32,
    #[serde(default = "default_num_landmarks")]
    pub num_landmarks: usize,
    #[serde(default = "default_presence_threshold")]
    pub presence_threshold: f32,
    /// Defaults to the model's first output.
    #[serde(default)]
    pub landmark_output: Option<String>,
    /// Defaults to the first other output holding a single value.
    #[serde(default)]
    pub presence_output: Option<String>,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

fn default_detector_input_size() -> u32 {
    224
}

fn default_num_landmarks() -> usize {
    21
}

fn default_presence_threshold() -> f32 {
    0.5
}

fn default_num_threads() -> usize {
    1
}

impl Validatable for DetectorConfig {
    fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnnotationConfig {
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    #[serde(default = "default_margin_px")]
    pub margin_px: i32,
    #[serde(default = "default_thickness")]
    pub thickness: i32,
    #[serde(default = "default_font_scale")]
    pub font_scale: f32,
}

fn default_margin_px() -> i32 {
    10
}

fn default_thickness() -> i32 {
    3
}

fn default_font_scale() -> f32 {
    40.0
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            margin_px: default_margin_px(),
            thickness: default_thickness(),
            font_scale: default_font_scale(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DevConfig {
    #[serde(default = "default_dev_password")]
    pub password: String,
}

fn default_dev_password() -> String {
    "11223344".into()
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            password: default_dev_password(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(format!("{}.yaml", environment.as_str())),
        ))
        .add_source(
            config::Environment::with_prefix("HS")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;

    for validation in [config.classifier.validate(), config.detector.validate()] {
        if let Err(e) = validation {
            tracing::error!("Configuration validation failed: {}", e);
            return Err(config::ConfigError::Message(e));
        }
    }

    Ok(config)
}
