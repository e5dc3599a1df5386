//! 检测记录校验
//!
//! 将记录存储中读取的原始JSON强制转换为检测定义。必填字段任何一项不合法
//! 都会拒绝整条记录；可选的 `state` 和 `lastChecked` 在缺失或格式错误时
//! 回退为 `down` 和未设置，使新建的检测可以被首次执行。

use crate::check::model::{
    Check, CheckState, HttpMethod, Protocol, CHECK_ID_LENGTH, OWNER_REF_LENGTH,
};
use crate::error::ValidationError;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

/// 校验器认识的字段，其余字段作为附加数据保留
const KNOWN_FIELDS: [&str; 9] = [
    "id",
    "userPhone",
    "protocol",
    "url",
    "method",
    "successCodes",
    "timeoutSeconds",
    "state",
    "lastChecked",
];

/// 校验原始检测记录
///
/// # 参数
/// * `raw` - 记录存储返回的原始JSON
///
/// # 返回
/// * `Result<Check, ValidationError>` - 校验通过的检测或第一个不合法的字段
pub fn validate_check(raw: &Value) -> Result<Check, ValidationError> {
    let record = raw.as_object().ok_or(ValidationError::NotAnObject)?;

    let id = fixed_length_string(record, "id", CHECK_ID_LENGTH, false)?;
    let url = non_empty_string(record, "url")?;
    let owner_ref = fixed_length_string(record, "userPhone", OWNER_REF_LENGTH, true)?;

    let method = HttpMethod::parse(string_field(record, "method")?).ok_or_else(|| {
        ValidationError::InvalidField {
            field: "method",
            reason: "必须是 get、post、put、delete 之一".to_string(),
        }
    })?;

    let protocol = Protocol::parse(string_field(record, "protocol")?).ok_or_else(|| {
        ValidationError::InvalidField {
            field: "protocol",
            reason: "必须是 http 或 https".to_string(),
        }
    })?;

    let success_codes = success_codes(record)?;
    let timeout_seconds = timeout_seconds(record)?;

    let state = record
        .get("state")
        .and_then(Value::as_str)
        .and_then(CheckState::parse)
        .unwrap_or_default();

    let last_checked = record.get("lastChecked").and_then(parse_last_checked);

    let extra = record
        .iter()
        .filter(|(key, _)| !KNOWN_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(Check {
        id,
        owner_ref,
        protocol,
        url,
        method,
        success_codes,
        timeout_seconds,
        state,
        last_checked,
        extra,
    })
}

fn string_field<'a>(
    record: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, ValidationError> {
    match record.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField { field }),
        Some(Value::String(value)) => Ok(value.as_str()),
        Some(_) => Err(ValidationError::InvalidField {
            field,
            reason: "必须是字符串".to_string(),
        }),
    }
}

fn fixed_length_string(
    record: &Map<String, Value>,
    field: &'static str,
    length: usize,
    trim: bool,
) -> Result<String, ValidationError> {
    let value = string_field(record, field)?;
    if value.trim().chars().count() != length {
        return Err(ValidationError::InvalidField {
            field,
            reason: format!("长度必须为 {length}"),
        });
    }
    Ok(if trim { value.trim() } else { value }.to_string())
}

fn non_empty_string(
    record: &Map<String, Value>,
    field: &'static str,
) -> Result<String, ValidationError> {
    let value = string_field(record, field)?.trim();
    if value.is_empty() {
        return Err(ValidationError::InvalidField {
            field,
            reason: "不能为空".to_string(),
        });
    }
    Ok(value.to_string())
}

fn success_codes(record: &Map<String, Value>) -> Result<Vec<u16>, ValidationError> {
    const FIELD: &str = "successCodes";

    let codes = match record.get(FIELD) {
        None | Some(Value::Null) => return Err(ValidationError::MissingField { field: FIELD }),
        Some(Value::Array(codes)) => codes,
        Some(_) => {
            return Err(ValidationError::InvalidField {
                field: FIELD,
                reason: "必须是数组".to_string(),
            })
        }
    };

    if codes.is_empty() {
        return Err(ValidationError::InvalidField {
            field: FIELD,
            reason: "至少需要一个状态码".to_string(),
        });
    }

    codes
        .iter()
        .map(|code| {
            code.as_u64()
                .filter(|code| (100..=599).contains(code))
                .map(|code| code as u16)
                .ok_or_else(|| ValidationError::InvalidField {
                    field: FIELD,
                    reason: format!("状态码 {code} 无效"),
                })
        })
        .collect()
}

fn timeout_seconds(record: &Map<String, Value>) -> Result<u8, ValidationError> {
    const FIELD: &str = "timeoutSeconds";

    let value = match record.get(FIELD) {
        None | Some(Value::Null) => return Err(ValidationError::MissingField { field: FIELD }),
        Some(value) => value,
    };

    // 5.0 这样的整数值浮点数同样接受
    let seconds = value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64));

    match seconds {
        Some(seconds @ 1..=5) => Ok(seconds as u8),
        _ => Err(ValidationError::InvalidField {
            field: FIELD,
            reason: "必须是 1 到 5 之间的整数".to_string(),
        }),
    }
}

/// 解析 `lastChecked`，非正数或超出时间范围的值视为未设置
pub(crate) fn parse_last_checked(value: &Value) -> Option<DateTime<Utc>> {
    let millis = value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .filter(|millis| *millis > 0)?;
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_record() -> Value {
        json!({
            "id": "abcdefghij0123456789",
            "userPhone": "5551234567",
            "protocol": "https",
            "url": "example.com",
            "method": "get",
            "successCodes": [200, 201],
            "timeoutSeconds": 3
        })
    }

    #[test]
    fn test_valid_record_defaults_optional_fields() {
        let check = validate_check(&valid_record()).unwrap();

        assert_eq!(check.id, "abcdefghij0123456789");
        assert_eq!(check.protocol, Protocol::Https);
        assert_eq!(check.method, HttpMethod::Get);
        assert_eq!(check.success_codes, vec![200, 201]);
        assert_eq!(check.timeout_seconds, 3);
        assert_eq!(check.state, CheckState::Down);
        assert!(check.last_checked.is_none());
    }

    #[test]
    fn test_existing_state_and_last_checked_are_kept() {
        let mut record = valid_record();
        record["state"] = json!("up");
        record["lastChecked"] = json!(1_700_000_000_000i64);

        let check = validate_check(&record).unwrap();
        assert_eq!(check.state, CheckState::Up);
        assert_eq!(
            check.last_checked.map(|t| t.timestamp_millis()),
            Some(1_700_000_000_000)
        );
    }

    #[test]
    fn test_malformed_optional_fields_fall_back() {
        let mut record = valid_record();
        record["state"] = json!("sideways");
        record["lastChecked"] = json!(false);

        let check = validate_check(&record).unwrap();
        assert_eq!(check.state, CheckState::Down);
        assert!(check.last_checked.is_none());

        record["lastChecked"] = json!(-5);
        assert!(validate_check(&record).unwrap().last_checked.is_none());
    }

    #[test]
    fn test_missing_success_codes_is_rejected() {
        let mut record = valid_record();
        record.as_object_mut().unwrap().remove("successCodes");

        assert_eq!(
            validate_check(&record),
            Err(ValidationError::MissingField {
                field: "successCodes"
            })
        );
    }

    #[test]
    fn test_empty_success_codes_is_rejected() {
        let mut record = valid_record();
        record["successCodes"] = json!([]);
        assert!(matches!(
            validate_check(&record),
            Err(ValidationError::InvalidField {
                field: "successCodes",
                ..
            })
        ));
    }

    #[test]
    fn test_wrong_id_length_is_rejected() {
        let mut record = valid_record();
        record["id"] = json!("short");
        assert!(matches!(
            validate_check(&record),
            Err(ValidationError::InvalidField { field: "id", .. })
        ));
    }

    #[test]
    fn test_timeout_range() {
        let mut record = valid_record();
        for bad in [json!(0), json!(6), json!(2.5), json!("3")] {
            record["timeoutSeconds"] = bad;
            assert!(validate_check(&record).is_err());
        }

        record["timeoutSeconds"] = json!(5.0);
        assert_eq!(validate_check(&record).unwrap().timeout_seconds, 5);
    }

    #[test]
    fn test_uppercase_method_and_unknown_protocol_are_rejected() {
        let mut record = valid_record();
        record["method"] = json!("GET");
        assert!(validate_check(&record).is_err());

        let mut record = valid_record();
        record["protocol"] = json!("ftp");
        assert!(matches!(
            validate_check(&record),
            Err(ValidationError::InvalidField {
                field: "protocol",
                ..
            })
        ));
    }

    #[test]
    fn test_url_is_trimmed() {
        let mut record = valid_record();
        record["url"] = json!("  example.com/path  ");
        assert_eq!(validate_check(&record).unwrap().url, "example.com/path");

        record["url"] = json!("   ");
        assert!(validate_check(&record).is_err());
    }

    #[test]
    fn test_unknown_fields_are_preserved() {
        let mut record = valid_record();
        record["label"] = json!("homepage");

        let check = validate_check(&record).unwrap();
        assert_eq!(check.extra.get("label"), Some(&json!("homepage")));
        assert!(!check.extra.contains_key("id"));
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert_eq!(
            validate_check(&json!([1, 2, 3])),
            Err(ValidationError::NotAnObject)
        );
    }
}
