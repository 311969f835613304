use chrono::{DateTime, TimeZone, Utc};
use scheduler_core::SchedulerError;
use scheduler_dispatcher::cron_utils::*;
use scheduler_domain::CronFields;

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

fn fields(expression: &str) -> CronFields {
    let parts: Vec<&str> = expression.split_whitespace().collect();
    CronFields::new(parts[0], parts[1], parts[2], parts[3], parts[4])
}

#[test]
fn test_next_run_at_is_strictly_after_anchor() {
    let daily = fields("0 3 * * *");

    let next = next_run_at(&daily, Some(at(2024, 1, 1, 2, 59))).unwrap();
    assert_eq!(next, at(2024, 1, 1, 3, 0));

    let next = next_run_at(&daily, Some(at(2024, 1, 1, 3, 0))).unwrap();
    assert_eq!(next, at(2024, 1, 2, 3, 0));
}

#[test]
fn test_next_run_at_without_anchor_uses_now() {
    let before = Utc::now();
    let next = next_run_at(&fields("* * * * *"), None).unwrap();
    assert!(next > before);
    assert!(next <= before + chrono::Duration::minutes(2));
}

#[test]
fn test_day_of_month_and_day_of_week_use_or_semantics() {
    // 每月13日或每周五
    let either = fields("0 0 13 * 5");

    // 2024-01-05 是周五
    assert_eq!(next_run_at(&either, Some(at(2024, 1, 1, 0, 0))).unwrap(), at(2024, 1, 5, 0, 0));
    // 周五之后的第一个匹配是13日（周六），AND 语义会一直等到 2024-09-13
    assert_eq!(next_run_at(&either, Some(at(2024, 1, 12, 0, 0))).unwrap(), at(2024, 1, 13, 0, 0));
    assert_eq!(next_run_at(&either, Some(at(2024, 1, 13, 0, 0))).unwrap(), at(2024, 1, 19, 0, 0));
}

#[test]
fn test_unrestricted_day_of_week_keeps_day_of_month() {
    let monthly = fields("30 6 1 * *");
    assert_eq!(
        next_run_at(&monthly, Some(at(2024, 1, 15, 0, 0))).unwrap(),
        at(2024, 2, 1, 6, 30)
    );
}

#[test]
fn test_day_of_week_accepts_seven_and_names() {
    // 2024-01-01 是周一
    let sunday = fields("0 12 * * 7");
    assert_eq!(next_run_at(&sunday, Some(at(2024, 1, 1, 0, 0))).unwrap(), at(2024, 1, 7, 12, 0));

    let sunday = fields("0 12 * * 0");
    assert_eq!(next_run_at(&sunday, Some(at(2024, 1, 1, 0, 0))).unwrap(), at(2024, 1, 7, 12, 0));

    let wednesday = fields("0 12 * * wed");
    assert_eq!(next_run_at(&wednesday, Some(at(2024, 1, 1, 0, 0))).unwrap(), at(2024, 1, 3, 12, 0));
}

#[test]
fn test_ranges_and_steps() {
    let every_quarter = fields("*/15 * * * *");
    assert_eq!(
        next_run_at(&every_quarter, Some(at(2024, 1, 1, 10, 7))).unwrap(),
        at(2024, 1, 1, 10, 15)
    );

    // 周五 10:00 之后的下一个工作日是周一
    let weekdays = fields("30 9 * * 1-5");
    assert_eq!(
        next_run_at(&weekdays, Some(at(2024, 1, 5, 10, 0))).unwrap(),
        at(2024, 1, 8, 9, 30)
    );
}

#[test]
fn test_next_run_after_keeps_anchor_cadence() {
    let hourly = fields("0 * * * *");
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 40).unwrap();

    let next = next_run_after(&hourly, Some(at(2024, 1, 1, 3, 0)), now).unwrap();
    assert_eq!(next, at(2024, 1, 1, 4, 0));
}

#[test]
fn test_next_run_after_catches_up_when_overdue() {
    let every_five = fields("*/5 * * * *");
    let now = at(2024, 1, 1, 1, 2);

    let next = next_run_after(&every_five, Some(at(2024, 1, 1, 0, 0)), now).unwrap();
    assert_eq!(next, at(2024, 1, 1, 1, 5));
    assert!(next > now);
}

#[test]
fn test_next_run_after_without_anchor() {
    let every_five = fields("*/5 * * * *");
    let now = at(2024, 1, 1, 1, 2);

    assert_eq!(next_run_after(&every_five, None, now).unwrap(), at(2024, 1, 1, 1, 5));
}

#[test]
fn test_invalid_fields_are_rejected() {
    for expression in [
        "61 * * * *",
        "* 24 * * *",
        "* * 32 * *",
        "* * * 13 *",
        "* * * * 8",
        "* * * * funday",
        "x * * * *",
    ] {
        let result = CronScheduler::new(&fields(expression));
        assert!(
            matches!(result, Err(SchedulerError::InvalidCron { .. })),
            "expected '{expression}' to be rejected"
        );
    }
}

#[test]
fn test_validate_cron_expression() {
    assert!(CronScheduler::validate_cron_expression("0 3 * * *").is_ok());
    assert!(CronScheduler::validate_cron_expression("*/5 9-17 * * 1-5").is_ok());
    assert!(CronScheduler::validate_cron_expression("0 3 * *").is_err());
    assert!(CronScheduler::validate_cron_expression("").is_err());
    assert!(CronScheduler::validate_cron_expression("0 0 3 * * *").is_err());
}

#[test]
fn test_upcoming_times() {
    let scheduler = CronScheduler::from_expression("0 */6 * * *").unwrap();
    assert_eq!(scheduler.expression(), "0 */6 * * *");

    let upcoming = scheduler.upcoming_times(at(2024, 1, 1, 5, 0), 3);
    assert_eq!(
        upcoming,
        vec![at(2024, 1, 1, 6, 0), at(2024, 1, 1, 12, 0), at(2024, 1, 1, 18, 0)]
    );
}
