//! 五段式CRON表达式的解析与下次执行时间计算
//!
//! 所有时间均按UTC计算，结果精确到分钟（秒为0）。
//!
//! 周字段接受 0-7（0 和 7 都表示周日）以及 SUN-SAT 英文缩写。
//! 日字段与周字段同时受限时按标准cron约定取"或"：某天只要匹配其中之一即可。
//! 以 `*` 开头的字段（包括 `*/2` 这类步长写法）视为不受限。

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::CronFields;

const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// CRON表达式解析和调度工具
#[derive(Debug, Clone)]
pub struct CronScheduler {
    expression: String,
    schedules: Vec<Schedule>,
}

impl CronScheduler {
    /// 根据五段式字段创建调度器
    pub fn new(fields: &CronFields) -> SchedulerResult<Self> {
        let expression = fields.expression();
        let invalid = |message: String| SchedulerError::InvalidCron {
            expr: expression.clone(),
            message,
        };

        let day_of_week = normalize_day_of_week(fields.day_of_week.trim()).map_err(invalid)?;
        let minute = fields.minute.trim();
        let hour = fields.hour.trim();
        let day_of_month = fields.day_of_month.trim();
        let month = fields.month.trim();

        let mut patterns = Vec::with_capacity(2);
        if is_restricted(day_of_month) && is_restricted(&fields.day_of_week) {
            patterns.push(format!("0 {minute} {hour} {day_of_month} {month} *"));
            patterns.push(format!("0 {minute} {hour} * {month} {day_of_week}"));
        } else {
            patterns.push(format!("0 {minute} {hour} {day_of_month} {month} {day_of_week}"));
        }

        let schedules = patterns
            .iter()
            .map(|pattern| Schedule::from_str(pattern).map_err(|e| invalid(e.to_string())))
            .collect::<SchedulerResult<Vec<_>>>()?;

        Ok(Self {
            expression,
            schedules,
        })
    }

    /// 从以空白分隔的五段式表达式创建调度器
    pub fn from_expression(cron_expr: &str) -> SchedulerResult<Self> {
        let parts: Vec<&str> = cron_expr.split_whitespace().collect();
        let [minute, hour, day_of_month, month, day_of_week] = parts[..] else {
            return Err(SchedulerError::InvalidCron {
                expr: cron_expr.to_string(),
                message: format!("需要5个字段，实际为{}个", parts.len()),
            });
        };

        Self::new(&CronFields::new(minute, hour, day_of_month, month, day_of_week))
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> SchedulerResult<()> {
        Self::from_expression(cron_expr).map(|_| ())
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 获取严格晚于 `anchor` 的下一次执行时间
    pub fn next_execution_time(&self, anchor: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedules
            .iter()
            .filter_map(|schedule| schedule.after(&anchor).find(|next| *next > anchor))
            .min()
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        let mut times = Vec::with_capacity(count);
        let mut cursor = from;
        while times.len() < count {
            match self.next_execution_time(cursor) {
                Some(next) => {
                    times.push(next);
                    cursor = next;
                }
                None => break,
            }
        }
        times
    }
}

/// 计算下一次执行时间，`anchor` 为空时从当前时间开始
pub fn next_run_at(
    fields: &CronFields,
    anchor: Option<DateTime<Utc>>,
) -> SchedulerResult<DateTime<Utc>> {
    let anchor = anchor.unwrap_or_else(Utc::now);
    let scheduler = CronScheduler::new(fields)?;
    scheduler
        .next_execution_time(anchor)
        .ok_or_else(|| no_upcoming_run(&scheduler))
}

/// 以计划的上次预定时间为锚点推进，避免执行耗时造成漂移
///
/// 锚点推进后仍不晚于 `now`（计划已错过不止一个周期）时改为从 `now` 计算，
/// 保证返回值总是晚于 `now`。
pub fn next_run_after(
    fields: &CronFields,
    anchor: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> SchedulerResult<DateTime<Utc>> {
    let scheduler = CronScheduler::new(fields)?;
    let from_anchor = scheduler
        .next_execution_time(anchor.unwrap_or(now))
        .ok_or_else(|| no_upcoming_run(&scheduler))?;

    if from_anchor > now {
        return Ok(from_anchor);
    }

    scheduler
        .next_execution_time(now)
        .ok_or_else(|| no_upcoming_run(&scheduler))
}

fn no_upcoming_run(scheduler: &CronScheduler) -> SchedulerError {
    SchedulerError::InvalidCron {
        expr: scheduler.expression.clone(),
        message: "没有可匹配的执行时间".to_string(),
    }
}

fn is_restricted(field: &str) -> bool {
    let field = field.trim();
    !(field.starts_with('*') || field == "?")
}

/// 将周字段展开为 SUN,MON 形式的名称列表
fn normalize_day_of_week(field: &str) -> Result<String, String> {
    if field.is_empty() {
        return Err("周字段不能为空".to_string());
    }
    if field == "*" || field == "?" {
        return Ok("*".to_string());
    }

    let mut days = BTreeSet::new();
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: usize = step
                    .parse()
                    .map_err(|_| format!("无效的步长: '{step}'"))?;
                if step == 0 {
                    return Err("步长必须大于0".to_string());
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range == "*" {
            (0, 6)
        } else if let Some((start, end)) = range.split_once('-') {
            (parse_weekday(start)?, parse_weekday(end)?)
        } else {
            let day = parse_weekday(range)?;
            if step > 1 {
                (day, 6)
            } else {
                (day, day)
            }
        };

        if start > end {
            return Err(format!("无效的范围: '{range}'"));
        }

        for day in (start..=end).step_by(step) {
            days.insert(day % 7);
        }
    }

    Ok(days
        .into_iter()
        .map(|day| WEEKDAY_NAMES[day])
        .collect::<Vec<_>>()
        .join(","))
}

fn parse_weekday(token: &str) -> Result<usize, String> {
    let token = token.trim();
    if let Ok(day) = token.parse::<usize>() {
        return if day <= 7 {
            Ok(day)
        } else {
            Err(format!("星期取值超出范围: {day}"))
        };
    }

    WEEKDAY_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(token))
        .ok_or_else(|| format!("无效的星期: '{token}'"))
}
