//! 节奏控制
//!
//! 每轮之间的等待时间不是固定值：基础间隔先按连续成功次数缩放，
//! 再叠加随机抖动，偶尔插入一次“走神”停顿。

use chrono::{DateTime, Local};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

use crate::config::PacingSettings;
use crate::services::score_writer::SubmissionMode;

/// 抖动后的最小/最大倍数
const GAUSSIAN_CLAMP: (f64, f64) = (0.4, 2.5);
const UNIFORM_RANGE: (f64, f64) = (0.5, 1.5);

/// 速度档位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedRegime {
    /// 刚开始，略慢
    Initial,
    Steady,
    /// 连续成功多次后略快，并带额外随机
    Fast,
}

/// 节奏生成器
pub struct Pacer {
    settings: PacingSettings,
    rng: StdRng,
}

impl Pacer {
    pub fn new(settings: PacingSettings) -> Self {
        Self {
            settings,
            rng: StdRng::from_os_rng(),
        }
    }

    /// 固定种子（测试用）
    pub fn seeded(settings: PacingSettings, seed: u64) -> Self {
        Self {
            settings,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn settings(&self) -> &PacingSettings {
        &self.settings
    }

    pub fn regime(&self, consecutive_success: u32) -> SpeedRegime {
        if consecutive_success >= self.settings.fast_after_successes {
            SpeedRegime::Fast
        } else if consecutive_success >= self.settings.warmup_successes {
            SpeedRegime::Steady
        } else {
            SpeedRegime::Initial
        }
    }

    /// 当前速度倍数（越小越快）
    pub fn speed_multiplier(&mut self, consecutive_success: u32) -> f64 {
        match self.regime(consecutive_success) {
            SpeedRegime::Initial => self.settings.initial_multiplier,
            SpeedRegime::Steady => self.settings.steady_multiplier,
            SpeedRegime::Fast => {
                let spread = self.settings.fast_spread.abs();
                let noise = if spread > 0.0 {
                    self.rng.random_range(-spread..=spread)
                } else {
                    0.0
                };
                self.settings.fast_multiplier * (1.0 + noise)
            }
        }
    }

    /// 对基础时长加抖动：大多数时候是高斯分布，少数时候是均匀分布
    pub fn jitter(&mut self, base: Duration) -> Duration {
        let factor = if self.rng.random_bool(self.settings.uniform_probability.clamp(0.0, 1.0)) {
            self.rng.random_range(UNIFORM_RANGE.0..=UNIFORM_RANGE.1)
        } else {
            let gaussian = 1.0 + self.settings.gaussian_spread * self.standard_normal();
            gaussian.clamp(GAUSSIAN_CLAMP.0, GAUSSIAN_CLAMP.1)
        };
        base.mul_f64(factor)
    }

    /// 下一轮前的等待时间
    pub fn next_delay(&mut self, consecutive_success: u32) -> Duration {
        let multiplier = self.speed_multiplier(consecutive_success);
        let base = self.settings.base_delay.mul_f64(multiplier.max(0.0));
        self.jitter(base)
    }

    /// 长时间卡住后的固定间隔（同样加抖动）
    pub fn refresh_delay(&mut self) -> Duration {
        self.jitter(self.settings.refresh_delay)
    }

    /// 是否插入一次走神停顿
    ///
    /// 距离上一次停顿不足冷却时间时不会触发。
    pub fn maybe_inattention(
        &mut self,
        last_pause_at: Option<DateTime<Local>>,
        now: DateTime<Local>,
    ) -> Option<Duration> {
        if let Some(last) = last_pause_at {
            let elapsed = (now - last).to_std().unwrap_or_default();
            if elapsed < self.settings.pause_cooldown {
                return None;
            }
        }

        if !self
            .rng
            .random_bool(self.settings.pause_probability.clamp(0.0, 1.0))
        {
            return None;
        }

        let min = self.settings.pause_min.as_millis() as u64;
        let max = (self.settings.pause_max.as_millis() as u64).max(min);
        Some(Duration::from_millis(self.rng.random_range(min..=max)))
    }

    /// 按权重挑选本轮的提交方式
    pub fn pick_mode(&mut self) -> SubmissionMode {
        let modes = SubmissionMode::all();
        match WeightedIndex::new(modes.iter().map(|m| m.weight())) {
            Ok(dist) => modes[dist.sample(&mut self.rng)],
            Err(_) => SubmissionMode::Both,
        }
    }

    /// Box-Muller
    fn standard_normal(&mut self) -> f64 {
        let u1: f64 = self.rng.random_range(f64::EPSILON..1.0);
        let u2: f64 = self.rng.random::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}
