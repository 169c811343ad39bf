//! スケジュール式と期間の変換
//!
//! マニフェストに書かれたスケジュールを AWS の
//! `rate(...)` / `cron(...)` 形式に正規化します。

use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static RATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^rate\((\d+) (minute|minutes|hour|hours|day|days)\)$").expect("valid regex")
});
static AWS_CRON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^cron\((.+)\)$").expect("valid regex"));
static CRON_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z*,/\-?LW#]+$").expect("valid regex"));
static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$").expect("valid regex")
});

const MINUTES_PER_HOUR: u64 = 60;
const MINUTES_PER_DAY: u64 = 24 * MINUTES_PER_HOUR;

/// スケジュールを AWS のスケジュール式に変換
///
/// 対応形式:
/// - `rate(1 hour)` / `rate(5 minutes)`（そのまま）
/// - `cron(0 12 * * ? *)`（AWS形式、そのまま）
/// - `@hourly` などの定義済みスケジュール
/// - `@every 1h30m`
/// - 標準の5フィールド cron（`0 9 * * 1-5`）
pub fn aws_schedule_expression(schedule: &str) -> Result<String, String> {
    let schedule = schedule.trim();
    if schedule.is_empty() {
        return Err("スケジュールが空です".to_string());
    }

    if schedule.starts_with("rate(") {
        return validate_rate(schedule).map(|_| schedule.to_string());
    }

    if let Some(caps) = AWS_CRON_RE.captures(schedule) {
        validate_aws_cron(&caps[1])?;
        return Ok(schedule.to_string());
    }

    if let Some(every) = schedule.strip_prefix("@every ") {
        return every_to_rate(every.trim());
    }

    let predefined = match schedule {
        "@yearly" | "@annually" => Some("cron(0 0 1 1 ? *)"),
        "@monthly" => Some("cron(0 0 1 * ? *)"),
        "@weekly" => Some("cron(0 0 ? * 1 *)"),
        "@daily" | "@midnight" => Some("cron(0 0 * * ? *)"),
        "@hourly" => Some("cron(0 * * * ? *)"),
        _ => None,
    };
    if let Some(expr) = predefined {
        return Ok(expr.to_string());
    }
    if schedule.starts_with('@') {
        return Err(format!("未対応の定義済みスケジュールです: {schedule}"));
    }

    standard_cron_to_aws(schedule)
}

fn validate_rate(expr: &str) -> Result<(), String> {
    let caps = RATE_RE
        .captures(expr)
        .ok_or_else(|| format!("rate 式の形式が不正です: {expr}"))?;
    let value: u64 = caps[1]
        .parse()
        .map_err(|_| format!("rate 式の値が不正です: {expr}"))?;
    let unit = &caps[2];

    if value == 0 {
        return Err(format!("rate 式の値は1以上である必要があります: {expr}"));
    }
    // AWS は値が1のとき単数形、それ以外は複数形しか受け付けない
    let plural = unit.ends_with('s');
    if value == 1 && plural {
        return Err(format!("値が1の場合は単数形の単位を使用してください: {expr}"));
    }
    if value > 1 && !plural {
        return Err(format!("値が2以上の場合は複数形の単位を使用してください: {expr}"));
    }
    Ok(())
}

fn validate_aws_cron(body: &str) -> Result<(), String> {
    let fields: Vec<&str> = body.split_whitespace().collect();
    if fields.len() != 6 {
        return Err(format!(
            "AWS の cron 式は6フィールドである必要があります: cron({body})"
        ));
    }
    if let Some(field) = fields.iter().find(|f| !CRON_FIELD_RE.is_match(f)) {
        return Err(format!("cron 式のフィールドが不正です: {field}"));
    }
    let (dom, dow) = (fields[2], fields[4]);
    if (dom == "?") == (dow == "?") {
        return Err(format!(
            "日と曜日のどちらか一方だけを '?' にしてください: cron({body})"
        ));
    }
    Ok(())
}

fn every_to_rate(every: &str) -> Result<String, String> {
    let duration = parse_duration(every)?;
    let secs = duration.as_secs();
    if secs % 60 != 0 {
        return Err(format!("@every の間隔は分単位である必要があります: {every}"));
    }
    let minutes = secs / 60;
    if minutes == 0 {
        return Err(format!("@every の間隔は1分以上である必要があります: {every}"));
    }

    let (value, unit) = if minutes % MINUTES_PER_DAY == 0 {
        (minutes / MINUTES_PER_DAY, "day")
    } else if minutes % MINUTES_PER_HOUR == 0 {
        (minutes / MINUTES_PER_HOUR, "hour")
    } else {
        (minutes, "minute")
    };
    let suffix = if value == 1 { "" } else { "s" };
    Ok(format!("rate({value} {unit}{suffix})"))
}

fn standard_cron_to_aws(schedule: &str) -> Result<String, String> {
    let fields: Vec<&str> = schedule.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(format!(
            "スケジュールの形式が不正です（5フィールドの cron, rate(...), cron(...), @hourly 等に対応）: {schedule}"
        ));
    }
    if let Some(field) = fields.iter().find(|f| !CRON_FIELD_RE.is_match(f)) {
        return Err(format!("cron 式のフィールドが不正です: {field}"));
    }

    let (minute, hour, mut dom, month, dow) =
        (fields[0].to_string(), fields[1], fields[2].to_string(), fields[3], fields[4]);
    let mut dow = shift_day_of_week(dow)?;

    // AWS は日と曜日の両方を指定できない
    let dom_any = dom == "*" || dom == "?";
    let dow_any = dow == "*" || dow == "?";
    match (dom_any, dow_any) {
        (_, true) => {
            dow = "?".to_string();
            if dom == "?" {
                dom = "*".to_string();
            }
        }
        (true, false) => dom = "?".to_string(),
        (false, false) => {
            return Err(format!(
                "日と曜日を同時に指定することはできません: {schedule}"
            ));
        }
    }

    let body = format!("{minute} {hour} {dom} {month} {dow} *");
    validate_aws_cron(&body)?;
    Ok(format!("cron({body})"))
}

/// 曜日番号を標準 cron（日曜=0）から AWS（日曜=1）へずらす
fn shift_day_of_week(field: &str) -> Result<String, String> {
    let shifted: Result<Vec<String>, String> = field
        .split(',')
        .map(|part| match part.split_once('/') {
            Some((base, step)) => Ok(format!("{}/{}", shift_range(base)?, step)),
            None => shift_range(part),
        })
        .collect();
    Ok(shifted?.join(","))
}

fn shift_range(part: &str) -> Result<String, String> {
    match part.split_once('-') {
        Some((start, end)) => Ok(format!("{}-{}", shift_day(start)?, shift_day(end)?)),
        None => shift_day(part),
    }
}

fn shift_day(token: &str) -> Result<String, String> {
    if !token.chars().all(|c| c.is_ascii_digit()) || token.is_empty() {
        // '*', '?', 曜日名などはそのまま
        return Ok(token.to_uppercase());
    }
    let day: u32 = token
        .parse()
        .map_err(|_| format!("曜日の値が不正です: {token}"))?;
    if day > 7 {
        return Err(format!("曜日の値は0〜7である必要があります: {token}"));
    }
    Ok(((day % 7) + 1).to_string())
}

/// `1h30m` / `45m` / `90s` 形式の期間をパース
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let caps = DURATION_RE
        .captures(value)
        .filter(|_| !value.is_empty())
        .ok_or_else(|| format!("期間の形式が不正です（例: 1h30m, 45m, 90s）: {value}"))?;

    let too_large = || format!("期間が大きすぎます: {value}");
    let part = |i: usize, unit: u64| -> Result<u64, String> {
        match caps.get(i) {
            Some(m) => m
                .as_str()
                .parse::<u64>()
                .ok()
                .and_then(|n| n.checked_mul(unit))
                .ok_or_else(too_large),
            None => Ok(0),
        }
    };
    let (hours, minutes, seconds) = (part(1, 3600)?, part(2, 60)?, part(3, 1)?);
    let secs = hours
        .checked_add(minutes)
        .and_then(|s| s.checked_add(seconds))
        .ok_or_else(too_large)?;
    if secs == 0 {
        return Err(format!("期間は0より大きい必要があります: {value}"));
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_passthrough() {
        assert_eq!(
            aws_schedule_expression("rate(1 hour)").unwrap(),
            "rate(1 hour)"
        );
        assert_eq!(
            aws_schedule_expression("rate(5 minutes)").unwrap(),
            "rate(5 minutes)"
        );
    }

    #[test]
    fn test_rate_unit_plurality() {
        assert!(aws_schedule_expression("rate(1 hours)").is_err());
        assert!(aws_schedule_expression("rate(2 hour)").is_err());
        assert!(aws_schedule_expression("rate(0 minutes)").is_err());
        assert!(aws_schedule_expression("rate(1 week)").is_err());
    }

    #[test]
    fn test_predefined_schedules() {
        assert_eq!(
            aws_schedule_expression("@hourly").unwrap(),
            "cron(0 * * * ? *)"
        );
        assert_eq!(
            aws_schedule_expression("@daily").unwrap(),
            "cron(0 0 * * ? *)"
        );
        assert_eq!(
            aws_schedule_expression("@weekly").unwrap(),
            "cron(0 0 ? * 1 *)"
        );
        assert!(aws_schedule_expression("@fortnightly").is_err());
    }

    #[test]
    fn test_every_to_rate() {
        assert_eq!(
            aws_schedule_expression("@every 1h30m").unwrap(),
            "rate(90 minutes)"
        );
        assert_eq!(
            aws_schedule_expression("@every 2h").unwrap(),
            "rate(2 hours)"
        );
        assert_eq!(
            aws_schedule_expression("@every 24h").unwrap(),
            "rate(1 day)"
        );
        assert!(aws_schedule_expression("@every 30s").is_err());
    }

    #[test]
    fn test_standard_cron_conversion() {
        // 平日9時
        assert_eq!(
            aws_schedule_expression("0 9 * * 1-5").unwrap(),
            "cron(0 9 ? * 2-6 *)"
        );
        // 毎月1日
        assert_eq!(
            aws_schedule_expression("30 2 1 * *").unwrap(),
            "cron(30 2 1 * ? *)"
        );
        // 日曜日（0 と 7 の両方）
        assert_eq!(
            aws_schedule_expression("0 0 * * 0,7").unwrap(),
            "cron(0 0 ? * 1,1 *)"
        );
        assert_eq!(
            aws_schedule_expression("0 0 * * MON").unwrap(),
            "cron(0 0 ? * MON *)"
        );
        // 日に '?' が書かれていても曜日と両方 '?' にはしない
        assert_eq!(
            aws_schedule_expression("0 0 ? * *").unwrap(),
            "cron(0 0 * * ? *)"
        );
        assert_eq!(
            aws_schedule_expression("0 0 ? * ?").unwrap(),
            "cron(0 0 * * ? *)"
        );
    }

    #[test]
    fn test_standard_cron_rejects_dom_and_dow() {
        assert!(aws_schedule_expression("0 0 1 * 1").is_err());
        assert!(aws_schedule_expression("0 0 * *").is_err());
        assert!(aws_schedule_expression("0 0 * * 9").is_err());
    }

    #[test]
    fn test_aws_cron_passthrough() {
        assert_eq!(
            aws_schedule_expression("cron(0 12 * * ? *)").unwrap(),
            "cron(0 12 * * ? *)"
        );
        assert!(aws_schedule_expression("cron(0 12 * * *)").is_err());
        assert!(aws_schedule_expression("cron(0 12 1 * 2 *)").is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("45m").unwrap(), Duration::from_secs(2700));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("0m").is_err());
        assert!(parse_duration("1d").is_err());
    }

    #[test]
    fn test_parse_duration_overflow() {
        assert!(parse_duration("5124095576030432h").is_err());
        assert!(parse_duration("99999999999999999999h30m").is_err());
        assert!(parse_duration("18446744073709551615s").is_ok());
        assert!(parse_duration("18446744073709551615s1").is_err());
        assert!(
            parse_duration("5124095576030432h")
                .unwrap_err()
                .contains("大きすぎます")
        );
    }
}
