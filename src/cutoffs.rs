use crate::schema::{InvoicingConfig, WeekCutoff};
use crate::utils::{
    checked_shift_weeks, due_date, shift_weeks, week_end, week_label, week_start_for,
};
use chrono::{Datelike, Days, NaiveDate, Weekday};
use log::{debug, warn};
use std::iter::successors;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekDirection {
    Backward,
    Forward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutoffRule {
    pub week_start_day: Weekday,
}

impl Default for CutoffRule {
    fn default() -> Self {
        Self::new(Weekday::Thu)
    }
}

impl CutoffRule {
    pub fn new(week_start_day: Weekday) -> Self {
        Self { week_start_day }
    }

    pub fn from_config(config: &InvoicingConfig) -> Self {
        Self::new(config.week_start_day)
    }

    pub fn for_department(config: &InvoicingConfig, department: Option<&str>) -> Self {
        department
            .and_then(|name| config.department_overrides.get(name))
            .map(|day| Self::new(*day))
            .unwrap_or_else(|| Self::from_config(config))
    }

    pub fn week_start_for(&self, date: NaiveDate) -> NaiveDate {
        week_start_for(date, self.week_start_day)
    }

    pub fn cutoff_for(&self, date: NaiveDate) -> WeekCutoff {
        WeekCutoff::starting(self.week_start_for(date))
    }

    /// `count` consecutive weeks around `anchor`, oldest first. Stops early
    /// rather than run past the dates chrono can represent.
    pub fn generate(
        &self,
        anchor: NaiveDate,
        count: usize,
        direction: WeekDirection,
    ) -> Vec<WeekCutoff> {
        let step = match direction {
            WeekDirection::Backward => -1,
            WeekDirection::Forward => 1,
        };

        let mut weeks: Vec<WeekCutoff> = successors(Some(self.week_start_for(anchor)), |week| {
            checked_shift_weeks(*week, step)
        })
        .take_while(|week| checked_shift_weeks(*week, 1).is_some())
        .take(count)
        .map(WeekCutoff::starting)
        .collect();

        if direction == WeekDirection::Backward {
            weeks.reverse();
        }
        if weeks.len() < count {
            warn!(
                "Only {} of {} week cutoffs around {} fit the calendar",
                weeks.len(),
                count,
                anchor
            );
        }

        debug!(
            "Generated {} week cutoffs ({:?}) around {}",
            weeks.len(),
            direction,
            anchor
        );
        weeks
    }

    pub fn recent_weeks(&self, today: NaiveDate, count: usize) -> Vec<WeekCutoff> {
        self.generate(today, count, WeekDirection::Backward)
    }

    /// Every week whose due date falls within `year`.
    ///
    /// The first of these may start in the previous year: a week closing on
    /// Dec 31 is due on Jan 1 and belongs to the year it is due in, not the
    /// year it started in.
    pub fn weeks_due_in_year(&self, year: i32) -> Vec<WeekCutoff> {
        let (Some(jan_first), Some(next_jan_first)) = (
            NaiveDate::from_ymd_opt(year, 1, 1),
            year.checked_add(1)
                .and_then(|next| NaiveDate::from_ymd_opt(next, 1, 1)),
        ) else {
            return Vec::new();
        };

        // Due dates land on the start weekday, so the first due date of the
        // year is the first such weekday on or after Jan 1.
        let lead = (self.week_start_day.num_days_from_monday() + 7
            - jan_first.weekday().num_days_from_monday())
            % 7;
        let first_due = jan_first + Days::new(lead as u64);

        let mut weeks = Vec::new();
        let mut week_start = shift_weeks(first_due, -1);
        while due_date(week_start) < next_jan_first {
            weeks.push(WeekCutoff::starting(week_start));
            week_start = shift_weeks(week_start, 1);
        }
        weeks
    }

    pub fn weeks_due_in_years(&self, years: &[i32]) -> Vec<WeekCutoff> {
        let mut years = years.to_vec();
        years.sort_unstable();
        years.dedup();

        years
            .into_iter()
            .flat_map(|year| self.weeks_due_in_year(year))
            .collect()
    }
}

impl WeekCutoff {
    pub fn starting(week_start: NaiveDate) -> Self {
        Self {
            week_start,
            week_end: week_end(week_start),
            due_date: due_date(week_start),
            label: week_label(week_start),
        }
    }

    pub fn next(&self) -> Self {
        Self::starting(shift_weeks(self.week_start, 1))
    }

    pub fn previous(&self) -> Self {
        Self::starting(shift_weeks(self.week_start, -1))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.week_start && date <= self.week_end
    }
}
