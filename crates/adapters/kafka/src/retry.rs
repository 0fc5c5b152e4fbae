//! 重试 topic 配置
//!
//! 处理失败的消息依次转发到带延迟的重试 topic，最终进入 DLT

use std::sync::Arc;
use std::time::Duration;

use autoconf_config::BackoffProperties;

use crate::template::KafkaTemplate;

/// 未设置上限时指数退避的最大间隔
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(30);

const RETRY_SUFFIX: &str = "-retry";
const DLT_SUFFIX: &str = "-dlt";

/// 带休眠的退避策略
///
/// 除 `delay` 外的字段只在配置中出现时才有值。
#[derive(Debug, Clone, PartialEq)]
pub struct SleepingBackOff {
    pub delay: Duration,
    pub max_delay: Option<Duration>,
    pub multiplier: Option<f64>,
    pub random: Option<bool>,
}

/// 退避策略的具体形态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackOffKind {
    Fixed,
    UniformRandom,
    Exponential,
    ExponentialRandom,
}

impl SleepingBackOff {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_delay: None,
            multiplier: None,
            random: None,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    pub fn with_random(mut self, random: bool) -> Self {
        self.random = Some(random);
        self
    }

    pub fn kind(&self) -> BackOffKind {
        let random = self.random.unwrap_or(false);
        if self.multiplier.is_some_and(|m| m > 0.0) {
            if random {
                BackOffKind::ExponentialRandom
            } else {
                BackOffKind::Exponential
            }
        } else if self.max_delay.is_some_and(|max| max > self.delay) {
            BackOffKind::UniformRandom
        } else {
            BackOffKind::Fixed
        }
    }

    /// 第 `attempt` 次重试（从 0 开始）的名义间隔，不含随机抖动
    pub fn interval(&self, attempt: u32) -> Duration {
        match self.kind() {
            BackOffKind::Fixed | BackOffKind::UniformRandom => self.delay,
            BackOffKind::Exponential | BackOffKind::ExponentialRandom => {
                let max = self
                    .max_delay
                    .filter(|max| *max > self.delay)
                    .unwrap_or(DEFAULT_MAX_INTERVAL);
                let multiplier = self.multiplier.unwrap_or(1.0);
                let millis = self.delay.as_millis() as f64 * multiplier.powi(attempt as i32);
                Duration::from_millis(millis as u64).min(max)
            }
        }
    }
}

/// 退避策略
#[derive(Debug, Clone, PartialEq)]
pub enum BackOffPolicy {
    /// 立即重试
    NoBackOff,
    Sleeping(SleepingBackOff),
}

impl BackOffPolicy {
    /// 延迟为 0 或未设置时不退避，两种策略互斥
    pub fn from_properties(backoff: &BackoffProperties) -> Self {
        let delay = backoff.delay_ms.unwrap_or(0);
        if delay > 0 {
            let mut policy = SleepingBackOff::new(Duration::from_millis(delay));
            policy.max_delay = backoff.max_delay_ms.map(Duration::from_millis);
            policy.multiplier = backoff.multiplier;
            policy.random = backoff.random;
            BackOffPolicy::Sleeping(policy)
        } else {
            BackOffPolicy::NoBackOff
        }
    }

    pub fn interval(&self, attempt: u32) -> Duration {
        match self {
            BackOffPolicy::NoBackOff => Duration::ZERO,
            BackOffPolicy::Sleeping(policy) => policy.interval(attempt),
        }
    }
}

/// 目标 topic 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationKind {
    Retry,
    Dlt,
}

/// 重试链中的一个 topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationTopic {
    pub name: String,
    pub delay: Duration,
    pub kind: DestinationKind,
}

/// 重试 topic 配置
#[derive(Debug, Clone)]
pub struct RetryTopicConfiguration {
    max_attempts: u32,
    back_off: BackOffPolicy,
    single_topic_for_same_intervals: bool,
    suffix_with_index_values: bool,
    auto_create_topics: bool,
    template: Arc<KafkaTemplate>,
}

impl RetryTopicConfiguration {
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn back_off(&self) -> &BackOffPolicy {
        &self.back_off
    }

    pub fn uses_single_topic_for_same_intervals(&self) -> bool {
        self.single_topic_for_same_intervals
    }

    pub fn suffixes_with_index_values(&self) -> bool {
        self.suffix_with_index_values
    }

    pub fn auto_creates_topics(&self) -> bool {
        self.auto_create_topics
    }

    pub fn template(&self) -> &Arc<KafkaTemplate> {
        &self.template
    }

    /// 计算主 topic 的重试链，最后一项为 DLT
    ///
    /// 开启同间隔复用时，末尾连续相同的延迟合并为一个 topic。
    pub fn destination_topics(&self, main_topic: &str) -> Vec<DestinationTopic> {
        let retries = self.max_attempts.saturating_sub(1);
        let delays: Vec<Duration> = (0..retries).map(|i| self.back_off.interval(i)).collect();

        let mut retry_delays = delays.clone();
        if self.single_topic_for_same_intervals {
            if let Some(last) = delays.last() {
                let trailing = delays.iter().rev().take_while(|d| *d == last).count();
                retry_delays.truncate(delays.len() - trailing + 1);
            }
        }

        let single = retry_delays.len() == 1;
        let mut topics: Vec<DestinationTopic> = retry_delays
            .iter()
            .enumerate()
            .map(|(index, delay)| {
                let suffix = if single {
                    RETRY_SUFFIX.to_string()
                } else if self.suffix_with_index_values {
                    format!("{}-{}", RETRY_SUFFIX, index)
                } else {
                    format!("{}-{}", RETRY_SUFFIX, delay.as_millis())
                };
                DestinationTopic {
                    name: format!("{}{}", main_topic, suffix),
                    delay: *delay,
                    kind: DestinationKind::Retry,
                }
            })
            .collect();

        topics.push(DestinationTopic {
            name: format!("{}{}", main_topic, DLT_SUFFIX),
            delay: Duration::ZERO,
            kind: DestinationKind::Dlt,
        });
        topics
    }
}

/// 重试 topic 配置构建器
#[derive(Debug, Clone)]
pub struct RetryTopicConfigurationBuilder {
    max_attempts: u32,
    back_off: BackOffPolicy,
    single_topic_for_same_intervals: bool,
    suffix_with_index_values: bool,
    auto_create_topics: bool,
}

impl Default for RetryTopicConfigurationBuilder {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            back_off: BackOffPolicy::Sleeping(SleepingBackOff::new(Duration::from_secs(1))),
            single_topic_for_same_intervals: false,
            suffix_with_index_values: false,
            auto_create_topics: true,
        }
    }
}

impl RetryTopicConfigurationBuilder {
    pub fn new_instance() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn use_single_topic_for_same_intervals(mut self) -> Self {
        self.single_topic_for_same_intervals = true;
        self
    }

    pub fn suffix_topics_with_index_values(mut self) -> Self {
        self.suffix_with_index_values = true;
        self
    }

    pub fn do_not_auto_create_retry_topics(mut self) -> Self {
        self.auto_create_topics = false;
        self
    }

    pub fn custom_back_off(mut self, back_off: SleepingBackOff) -> Self {
        self.back_off = BackOffPolicy::Sleeping(back_off);
        self
    }

    pub fn no_back_off(mut self) -> Self {
        self.back_off = BackOffPolicy::NoBackOff;
        self
    }

    pub fn back_off(mut self, back_off: BackOffPolicy) -> Self {
        self.back_off = back_off;
        self
    }

    pub fn create(self, template: Arc<KafkaTemplate>) -> RetryTopicConfiguration {
        RetryTopicConfiguration {
            max_attempts: self.max_attempts,
            back_off: self.back_off,
            single_topic_for_same_intervals: self.single_topic_for_same_intervals,
            suffix_with_index_values: self.suffix_with_index_values,
            auto_create_topics: self.auto_create_topics,
            template,
        }
    }
}
