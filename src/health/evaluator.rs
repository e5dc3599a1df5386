//! 检测结果评估器
//!
//! 根据上一次的检测状态和本次结果计算新状态，决定是否告警，
//! 并依次完成持久化、写日志、告警三个副作用

use crate::check::{Check, CheckState};
use crate::error::StoreError;
use crate::health::result::{Decision, Outcome};
use crate::logs::{LogRecord, LogStore};
use crate::notification::AlertDispatcher;
use crate::store::RecordStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// 纯决策：计算新状态及是否需要告警
///
/// 只有当没有错误且响应码在成功集合内时状态为 `up`；从未检测过的检测
/// 在首次结果上永远不告警。
pub fn evaluate(previous: &Check, outcome: &Outcome) -> Decision {
    let new_state = match outcome {
        Outcome::Response { response_code } if previous.accepts(*response_code) => CheckState::Up,
        _ => CheckState::Down,
    };

    Decision {
        new_state,
        alert_warranted: previous.has_been_checked() && new_state != previous.state,
    }
}

/// 一次评估的执行结果
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    /// 决策
    pub decision: Decision,
    /// 新状态是否已持久化
    pub persisted: bool,
    /// 日志是否已写入
    pub logged: bool,
    /// 是否已调用告警分发
    pub alert_dispatched: bool,
}

/// 结果处理器，持有评估副作用所需的协作者
pub struct OutcomeProcessor {
    /// 记录存储
    store: Arc<dyn RecordStore>,
    /// 检测日志
    logs: Arc<LogStore>,
    /// 告警分发器
    dispatcher: Arc<AlertDispatcher>,
}

impl OutcomeProcessor {
    /// 创建结果处理器
    pub fn new(
        store: Arc<dyn RecordStore>,
        logs: Arc<LogStore>,
        dispatcher: Arc<AlertDispatcher>,
    ) -> Self {
        Self {
            store,
            logs,
            dispatcher,
        }
    }

    /// 处理一次检测结果
    pub async fn process(&self, previous: &Check, outcome: Outcome) -> EvaluationReport {
        self.process_at(previous, outcome, Utc::now()).await
    }

    /// 以指定的检测时间处理结果
    ///
    /// 顺序：持久化新状态 -> 追加日志（无论是否告警）-> 告警。
    /// 持久化失败时不重试，也不告警，下个周期会从最后一次成功存储的状态重新评估。
    pub async fn process_at(
        &self,
        previous: &Check,
        outcome: Outcome,
        checked_at: DateTime<Utc>,
    ) -> EvaluationReport {
        let decision = evaluate(previous, &outcome);
        let updated = previous.with_result(decision.new_state, checked_at);

        let persisted = match self
            .store
            .update(&previous.id, &updated, previous.last_checked)
            .await
        {
            Ok(()) => true,
            Err(StoreError::Conflict { id }) => {
                warn!("检测记录已被并发更新，放弃本次结果: {}", id);
                false
            }
            Err(e) => {
                error!("保存检测状态失败: {} - {}", previous.id, e);
                false
            }
        };

        let record = LogRecord {
            check: previous.clone(),
            outcome,
            state: decision.new_state,
            alert: decision.alert_warranted,
            time: checked_at,
        };
        let logged = match self.logs.append(&previous.id, &record).await {
            Ok(()) => true,
            Err(e) => {
                error!("写入检测日志失败: {} - {}", previous.id, e);
                false
            }
        };

        let alert_dispatched = if decision.alert_warranted && persisted {
            self.dispatcher.dispatch(&updated).await;
            true
        } else {
            if decision.alert_warranted {
                warn!("状态未能持久化，跳过告警: {}", previous.id);
            } else {
                debug!("检测状态未变化，无需告警: {}", previous.id);
            }
            false
        };

        EvaluationReport {
            decision,
            persisted,
            logged,
            alert_dispatched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{HttpMethod, Protocol};
    use crate::error::ProbeError;
    use chrono::Duration;
    use serde_json::Map;

    fn check_with(state: CheckState, last_checked: Option<DateTime<Utc>>, codes: Vec<u16>) -> Check {
        Check {
            id: "abcdefghij0123456789".to_string(),
            owner_ref: "5551234567".to_string(),
            protocol: Protocol::Https,
            url: "example.com".to_string(),
            method: HttpMethod::Get,
            success_codes: codes,
            timeout_seconds: 3,
            state,
            last_checked,
            extra: Map::new(),
        }
    }

    fn outcomes() -> Vec<Outcome> {
        vec![
            Outcome::response(200),
            Outcome::response(201),
            Outcome::response(301),
            Outcome::response(404),
            Outcome::response(500),
            Outcome::transport("Connection refused"),
            Outcome::timeout(),
        ]
    }

    #[test]
    fn test_up_iff_no_error_and_code_accepted() {
        let code_sets = [vec![], vec![200], vec![200, 201], vec![404]];
        for codes in code_sets {
            let check = check_with(CheckState::Down, None, codes.clone());
            for outcome in outcomes() {
                let expected_up = matches!(
                    &outcome,
                    Outcome::Response { response_code } if codes.contains(response_code)
                );
                let decision = evaluate(&check, &outcome);
                assert_eq!(
                    decision.new_state.is_up(),
                    expected_up,
                    "codes={codes:?} outcome={outcome:?}"
                );
            }
        }
    }

    #[test]
    fn test_first_evaluation_never_alerts() {
        for state in [CheckState::Up, CheckState::Down] {
            let check = check_with(state, None, vec![200]);
            for outcome in outcomes() {
                assert!(!evaluate(&check, &outcome).alert_warranted);
            }
        }
    }

    #[test]
    fn test_alert_iff_transition_after_first_measurement() {
        let checked = Some(Utc::now() - Duration::hours(1));
        let cases = [
            (CheckState::Down, Outcome::response(200), true),
            (CheckState::Up, Outcome::response(500), true),
            (CheckState::Up, Outcome::Failed(ProbeError::Timeout), true),
            (CheckState::Up, Outcome::response(200), false),
            (CheckState::Down, Outcome::response(500), false),
            (CheckState::Down, Outcome::timeout(), false),
        ];

        for (state, outcome, expected) in cases {
            let check = check_with(state, checked, vec![200]);
            assert_eq!(
                evaluate(&check, &outcome).alert_warranted,
                expected,
                "{state} -> {outcome}"
            );
        }
    }
}
