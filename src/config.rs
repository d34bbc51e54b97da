use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// 评分后端
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScoringBackend {
    /// 外部评分服务（HTTP JSON）
    Http,
    /// 直接调用兼容 OpenAI 的多模态模型
    Llm,
}

impl FromStr for ScoringBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "llm" | "openai" => Ok(Self::Llm),
            other => Err(format!("未知的评分后端: {}", other)),
        }
    }
}

/// 经验阈值
///
/// 各平台实测调出来的数值，全部可通过环境变量调整。
#[derive(Clone, Debug, PartialEq)]
pub struct Thresholds {
    /// 候选元素最小渲染宽度（过滤图标、logo）
    pub min_candidate_width: f64,
    pub min_candidate_height: f64,
    /// 小于该字节数的图像视为尚未加载完成
    pub min_artifact_bytes: usize,
    /// 连续等待多少次后提示刷新
    pub wait_refresh_threshold: u32,
    /// 键盘打分后确认轮询次数与间隔
    pub keypad_poll_attempts: u32,
    pub keypad_poll_interval: Duration,
    /// 按回车后等待页面跳转的时间
    pub navigation_wait: Duration,
    /// 数字键盘最少按钮数
    pub keypad_min_buttons: usize,
    /// 合并图像的最大宽度
    pub merge_max_width: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_candidate_width: 120.0,
            min_candidate_height: 80.0,
            min_artifact_bytes: 2048,
            wait_refresh_threshold: 5,
            keypad_poll_attempts: 10,
            keypad_poll_interval: Duration::from_millis(150),
            navigation_wait: Duration::from_millis(1200),
            keypad_min_buttons: 3,
            merge_max_width: 2000,
        }
    }
}

/// 节奏参数
#[derive(Clone, Debug, PartialEq)]
pub struct PacingSettings {
    /// 每轮之间的基础间隔
    pub base_delay: Duration,
    /// 连续等待过久后的固定重试间隔
    pub refresh_delay: Duration,
    /// 循环内单次扫描失败后的短重试间隔
    pub extract_retry_delay: Duration,
    /// 连续成功多少次后进入常速
    pub warmup_successes: u32,
    /// 连续成功多少次后进入快速
    pub fast_after_successes: u32,
    pub initial_multiplier: f64,
    pub steady_multiplier: f64,
    pub fast_multiplier: f64,
    /// 快速档的随机浮动比例
    pub fast_spread: f64,
    /// 改用均匀分布的概率
    pub uniform_probability: f64,
    /// 高斯分布标准差与基础值之比
    pub gaussian_spread: f64,
    /// 模拟走神的概率与冷却时间
    pub pause_probability: f64,
    pub pause_cooldown: Duration,
    pub pause_min: Duration,
    pub pause_max: Duration,
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1500),
            refresh_delay: Duration::from_secs(8),
            extract_retry_delay: Duration::from_millis(600),
            warmup_successes: 5,
            fast_after_successes: 20,
            initial_multiplier: 1.3,
            steady_multiplier: 1.0,
            fast_multiplier: 0.8,
            fast_spread: 0.15,
            uniform_probability: 0.15,
            gaussian_spread: 0.25,
            pause_probability: 0.06,
            pause_cooldown: Duration::from_secs(90),
            pause_min: Duration::from_millis(2500),
            pause_max: Duration::from_millis(6500),
        }
    }
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 阅卷页面地址（找不到已打开的页面时导航过去）
    pub target_url: Option<String>,
    /// 按标题片段查找已打开的阅卷页面
    pub target_title: Option<String>,
    /// 启动无头浏览器而不是连接已有浏览器（调试用）
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    /// 默认评分策略
    pub default_strategy: String,
    // --- 评分后端 ---
    pub scoring_backend: ScoringBackend,
    pub scoring_api_base_url: String,
    pub scoring_api_token: String,
    pub scoring_timeout: Duration,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    // --- 配置文件 ---
    pub profile_file: Option<PathBuf>,
    pub rubric_file: Option<PathBuf>,
    pub thresholds: Thresholds,
    pub pacing: PacingSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: 9222,
            target_url: None,
            target_title: None,
            headless: false,
            chrome_executable: None,
            default_strategy: "default".to_string(),
            scoring_backend: ScoringBackend::Http,
            scoring_api_base_url: "http://127.0.0.1:8787".to_string(),
            scoring_api_token: String::new(),
            scoring_timeout: Duration::from_secs(90),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o".to_string(),
            profile_file: None,
            rubric_file: None,
            thresholds: Thresholds::default(),
            pacing: PacingSettings::default(),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_millis(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_millis)
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT").unwrap_or(default.browser_debug_port),
            target_url: env_string("TARGET_URL").or(default.target_url),
            target_title: env_string("TARGET_TITLE").or(default.target_title),
            headless: env_parse("HEADLESS").unwrap_or(default.headless),
            chrome_executable: env_string("CHROME_EXECUTABLE").map(PathBuf::from).or(default.chrome_executable),
            default_strategy: env_string("DEFAULT_STRATEGY").unwrap_or(default.default_strategy),
            scoring_backend: env_parse("SCORING_BACKEND").unwrap_or(default.scoring_backend),
            scoring_api_base_url: env_string("SCORING_API_BASE_URL").unwrap_or(default.scoring_api_base_url),
            scoring_api_token: env_string("SCORING_API_TOKEN").unwrap_or(default.scoring_api_token),
            scoring_timeout: env_parse::<u64>("SCORING_TIMEOUT_SECS").map(Duration::from_secs).unwrap_or(default.scoring_timeout),
            llm_api_key: env_string("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: env_string("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: env_string("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            profile_file: env_string("PROFILE_FILE").map(PathBuf::from).or(default.profile_file),
            rubric_file: env_string("RUBRIC_FILE").map(PathBuf::from).or(default.rubric_file),
            thresholds: Thresholds::from_env(default.thresholds),
            pacing: PacingSettings::from_env(default.pacing),
        }
    }
}

impl Thresholds {
    fn from_env(default: Self) -> Self {
        Self {
            min_candidate_width: env_parse("MIN_CANDIDATE_WIDTH").unwrap_or(default.min_candidate_width),
            min_candidate_height: env_parse("MIN_CANDIDATE_HEIGHT").unwrap_or(default.min_candidate_height),
            min_artifact_bytes: env_parse("MIN_ARTIFACT_BYTES").unwrap_or(default.min_artifact_bytes),
            wait_refresh_threshold: env_parse("WAIT_REFRESH_THRESHOLD").unwrap_or(default.wait_refresh_threshold),
            keypad_poll_attempts: env_parse("KEYPAD_POLL_ATTEMPTS").unwrap_or(default.keypad_poll_attempts),
            keypad_poll_interval: env_millis("KEYPAD_POLL_INTERVAL_MS").unwrap_or(default.keypad_poll_interval),
            navigation_wait: env_millis("NAVIGATION_WAIT_MS").unwrap_or(default.navigation_wait),
            keypad_min_buttons: env_parse("KEYPAD_MIN_BUTTONS").unwrap_or(default.keypad_min_buttons),
            merge_max_width: env_parse("MERGE_MAX_WIDTH").unwrap_or(default.merge_max_width),
        }
    }
}

impl PacingSettings {
    fn from_env(default: Self) -> Self {
        Self {
            base_delay: env_millis("BASE_DELAY_MS").unwrap_or(default.base_delay),
            refresh_delay: env_millis("REFRESH_DELAY_MS").unwrap_or(default.refresh_delay),
            extract_retry_delay: env_millis("EXTRACT_RETRY_DELAY_MS").unwrap_or(default.extract_retry_delay),
            warmup_successes: env_parse("WARMUP_SUCCESSES").unwrap_or(default.warmup_successes),
            fast_after_successes: env_parse("FAST_AFTER_SUCCESSES").unwrap_or(default.fast_after_successes),
            pause_probability: env_parse("PAUSE_PROBABILITY").unwrap_or(default.pause_probability),
            ..default
        }
    }
}
