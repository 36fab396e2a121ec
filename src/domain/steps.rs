use crate::domain::models::StepsDay;
use crate::infrastructure::bluetooth::protocol::{
    decode_history_day, decode_today, HistoryDay, TodayRecord,
};
use chrono::{Duration, NaiveDate};

/// Number of past days reported by [`StepsData::history_list`]
pub const REPORTED_HISTORY_DAYS: usize = 30;

/// Raw step payloads collected during one read cycle.
///
/// The bytes are kept as received and decoded on access, so a short or
/// missing page simply reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepsData {
    today: Option<Vec<u8>>,
    history: Vec<Vec<u8>>,
}

impl StepsData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.today = None;
        self.history.clear();
    }

    pub fn set_today_data(&mut self, data: Vec<u8>) {
        self.today = Some(data);
    }

    pub fn push_history_data(&mut self, data: Vec<u8>) {
        self.history.push(data);
    }

    pub fn today_data(&self) -> Option<&[u8]> {
        self.today.as_deref()
    }

    pub fn history_data(&self) -> &[Vec<u8>] {
        &self.history
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn today(&self) -> TodayRecord {
        decode_today(self.today_data().unwrap_or_default())
    }

    /// Decoded history page; index 0 is yesterday.
    pub fn history_day(&self, index: usize) -> HistoryDay {
        decode_history_day(self.history.get(index).map(Vec::as_slice).unwrap_or_default())
    }

    pub fn steps_today(&self) -> u32 {
        self.today().steps
    }

    pub fn exercise_time_today(&self) -> u16 {
        self.today().exercise_time
    }

    pub fn nr_of_step_records(&self) -> u8 {
        self.today().nr_step_records
    }

    pub fn nr_of_sleep_records(&self) -> u16 {
        self.today().nr_sleep_records
    }

    pub fn total_steps_walked(&self) -> u64 {
        let history: u64 = (0..self.history.len())
            .map(|i| u64::from(self.history_day(i).steps))
            .sum();
        u64::from(self.steps_today()) + history
    }

    pub fn total_exercise_time(&self) -> u64 {
        let history: u64 = (0..self.history.len())
            .map(|i| u64::from(self.history_day(i).exercise_time))
            .sum();
        u64::from(self.exercise_time_today()) + history
    }

    /// Today followed by the previous 30 days, newest first.
    ///
    /// Days beyond the retrieved history are reported with zero steps.
    pub fn history_list(&self, today: NaiveDate) -> Vec<StepsDay> {
        let mut days = Vec::with_capacity(REPORTED_HISTORY_DAYS + 1);
        days.push(StepsDay::new(
            i64::from(self.steps_today()),
            iso_date(today),
            i64::from(self.exercise_time_today()),
        ));

        for i in 0..REPORTED_HISTORY_DAYS {
            let date = iso_date(today - Duration::days(i as i64 + 1));
            let day = if i < self.history.len() {
                let page = self.history_day(i);
                StepsDay::new(
                    i64::from(page.steps),
                    date,
                    i64::from(page.exercise_time),
                )
            } else {
                StepsDay::new(0, date, 0)
            };
            days.push(day);
        }

        days
    }
}

fn iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
