use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Предел перебора дней при поиске ближайшего рабочего дня
pub const NEAREST_WORKING_DAY_LIMIT: u32 = 31;

/// Выходные по умолчанию: воскресенье (0) и суббота (6)
const DEFAULT_WEEKENDS: [u32; 2] = [0, 6];

/// Запись расписания витрины для конкретного дня
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DayEntry {
    pub weekend: Option<bool>,
    pub status: Option<String>,
}

impl DayEntry {
    /// Рабочий ли день по записи; `None`, если запись ничего не говорит
    pub fn is_working(&self) -> Option<bool> {
        if let Some(weekend) = self.weekend {
            return Some(!weekend);
        }
        self.status.as_deref().map(|status| status != "weekend")
    }

    fn is_weekend(&self) -> bool {
        match self.weekend {
            Some(weekend) => weekend,
            None => self.status.as_deref() == Some("weekend"),
        }
    }
}

/// Расписание витрины: выходные, рабочие дни и явные исключения
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schedule {
    pub weekends: Vec<i64>,
    pub workdays: Vec<i64>,
    /// Индекс дня недели (0 = воскресенье) -> запись
    pub days: BTreeMap<String, DayEntry>,
    /// Дата `YYYY-MM-DD` -> запись
    pub dates: BTreeMap<String, DayEntry>,
}

/// Рабочий календарь, вычисленный один раз из расписания
#[derive(Debug, Clone)]
pub struct WorkCalendar {
    weekends: BTreeSet<u32>,
    days: BTreeMap<u32, DayEntry>,
    dates: BTreeMap<NaiveDate, DayEntry>,
}

impl Default for WorkCalendar {
    fn default() -> Self {
        Self::resolve(&Schedule::default())
    }
}

impl WorkCalendar {
    pub fn resolve(schedule: &Schedule) -> Self {
        let days = schedule
            .days
            .iter()
            .filter_map(|(k, v)| k.trim().parse::<i64>().ok().map(|d| (normalize_weekday(d), v.clone())))
            .collect::<BTreeMap<_, _>>();

        let dates = schedule
            .dates
            .iter()
            .filter_map(|(k, v)| {
                NaiveDate::parse_from_str(k.trim(), "%Y-%m-%d")
                    .ok()
                    .map(|d| (d, v.clone()))
            })
            .collect::<BTreeMap<_, _>>();

        // Выходные: явный список, дополнение рабочих дней или записи по дням недели
        let detected: BTreeSet<u32> = if !schedule.weekends.is_empty() {
            schedule.weekends.iter().copied().map(normalize_weekday).collect()
        } else if !schedule.workdays.is_empty() {
            let workdays: BTreeSet<u32> =
                schedule.workdays.iter().copied().map(normalize_weekday).collect();
            (0..7).filter(|d| !workdays.contains(d)).collect()
        } else {
            days.iter()
                .filter(|(_, entry)| entry.is_weekend())
                .map(|(d, _)| *d)
                .collect()
        };

        let weekends = if detected.is_empty() {
            DEFAULT_WEEKENDS.into_iter().collect()
        } else {
            detected
        };

        Self {
            weekends,
            days,
            dates,
        }
    }

    pub fn weekends(&self) -> &BTreeSet<u32> {
        &self.weekends
    }

    /// Проверка, является ли дата рабочим днём
    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        if let Some(status) = self.dates.get(&date).and_then(DayEntry::is_working) {
            return status;
        }

        let weekday = date.weekday().num_days_from_sunday();
        if self.weekends.contains(&weekday) {
            return false;
        }

        self.days
            .get(&weekday)
            .and_then(DayEntry::is_working)
            .unwrap_or(true)
    }

    /// Ближайший рабочий день начиная с `moment` (включительно)
    pub fn nearest_working_day(&self, moment: NaiveDateTime) -> NaiveDateTime {
        let mut candidate = moment;
        let mut limit = NEAREST_WORKING_DAY_LIMIT;
        while !self.is_working_day(candidate.date()) && limit > 0 {
            let Some(next) = candidate.checked_add_signed(Duration::days(1)) else {
                break;
            };
            candidate = next;
            limit -= 1;
        }
        candidate
    }
}

fn normalize_weekday(day: i64) -> u32 {
    day.rem_euclid(7) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    #[test]
    fn default_weekends_are_saturday_and_sunday() {
        let calendar = WorkCalendar::default();
        assert_eq!(calendar.weekends().iter().copied().collect::<Vec<_>>(), vec![0, 6]);
        // 2026-10-17 суббота, 2026-10-19 понедельник
        assert!(!calendar.is_working_day(at(2026, 10, 17).date()));
        assert!(calendar.is_working_day(at(2026, 10, 19).date()));
    }

    #[test]
    fn weekends_from_workdays_complement() {
        let schedule = Schedule {
            workdays: vec![1, 2, 3, 4, 5, 6],
            ..Default::default()
        };
        let calendar = WorkCalendar::resolve(&schedule);
        assert_eq!(calendar.weekends().iter().copied().collect::<Vec<_>>(), vec![0]);
        assert!(calendar.is_working_day(at(2026, 10, 17).date()));
    }

    #[test]
    fn weekends_from_day_entries_and_negative_indices() {
        let mut days = BTreeMap::new();
        days.insert(
            "-6".to_string(),
            DayEntry {
                status: Some("weekend".into()),
                ..Default::default()
            },
        );
        days.insert(
            "3".to_string(),
            DayEntry {
                weekend: Some(true),
                ..Default::default()
            },
        );
        let calendar = WorkCalendar::resolve(&Schedule {
            days,
            ..Default::default()
        });
        assert_eq!(calendar.weekends().iter().copied().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn date_override_wins_over_weekend() {
        let mut dates = BTreeMap::new();
        dates.insert(
            "2026-10-17".to_string(),
            DayEntry {
                status: Some("workday".into()),
                ..Default::default()
            },
        );
        dates.insert(
            "2026-10-19".to_string(),
            DayEntry {
                weekend: Some(true),
                ..Default::default()
            },
        );
        let calendar = WorkCalendar::resolve(&Schedule {
            dates,
            ..Default::default()
        });
        assert!(calendar.is_working_day(at(2026, 10, 17).date()));
        assert!(!calendar.is_working_day(at(2026, 10, 19).date()));
    }

    #[test]
    fn nearest_working_day_keeps_working_date() {
        let calendar = WorkCalendar::default();
        let monday = at(2026, 10, 19);
        assert_eq!(calendar.nearest_working_day(monday), monday);
    }

    #[test]
    fn nearest_working_day_skips_weekend_run() {
        let calendar = WorkCalendar::default();
        assert_eq!(calendar.nearest_working_day(at(2026, 10, 17)), at(2026, 10, 19));
    }

    #[test]
    fn nearest_working_day_is_bounded() {
        let calendar = WorkCalendar::resolve(&Schedule {
            weekends: (0..7).collect(),
            ..Default::default()
        });
        let start = at(2026, 10, 1);
        assert_eq!(
            calendar.nearest_working_day(start),
            start + Duration::days(NEAREST_WORKING_DAY_LIMIT as i64)
        );
    }

    #[test]
    fn nearest_working_day_stops_at_calendar_end() {
        let calendar = WorkCalendar::resolve(&Schedule {
            weekends: (0..7).collect(),
            ..Default::default()
        });
        assert_eq!(calendar.nearest_working_day(NaiveDateTime::MAX), NaiveDateTime::MAX);
    }
}
