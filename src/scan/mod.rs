//! Bounded sliding window of day contexts.
//!
//! Keeps at most three station-days resident (previous/current/next) while
//! a scan walks forward through the archive. The window owns the contexts;
//! the contexts hold only weak neighbor links, which the window wires on
//! insert and clears on eviction so a departing day becomes collectible.

use crate::engine::DayContext;
use chrono::NaiveDate;
use std::collections::VecDeque;
use std::sync::Arc;

/// Default capacity for the day window.
const DEFAULT_CAPACITY: usize = 3;

/// Sliding window keeping up to `capacity` day contexts in memory.
///
/// Days are stored with their dates and kept in chronological order. When
/// the window is full, the oldest day is evicted on insert and its
/// neighbor links are cleared.
pub struct DayWindow {
    /// (date, context) pairs ordered by date
    days: VecDeque<(NaiveDate, Arc<DayContext>)>,
    /// Maximum number of days to keep
    capacity: usize,
}

impl Default for DayWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl DayWindow {
    /// Creates a window with the default capacity (3 days).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a window with the specified capacity (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            days: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Inserts a day context, maintaining chronological order.
    ///
    /// Evicts the oldest resident day when at capacity (a day older than
    /// every resident one is dropped instead of inserted). Re-inserting an
    /// existing date replaces that day's context. Neighbor links of all
    /// resident days are rewired after the change.
    pub fn advance(&mut self, date: NaiveDate, context: Arc<DayContext>) {
        if let Some(pos) = self.days.iter().position(|(d, _)| *d == date) {
            self.days[pos].1.clear_neighbors();
            self.days[pos] = (date, context);
            self.relink();
            return;
        }

        let insert_pos = self
            .days
            .iter()
            .position(|(d, _)| *d > date)
            .unwrap_or(self.days.len());

        if self.days.len() >= self.capacity {
            if insert_pos == 0 {
                log::debug!(
                    "DayWindow: skipping insert of old day {} (oldest is {:?})",
                    date,
                    self.days.front().map(|(d, _)| *d)
                );
                return;
            }
            if let Some((evicted_date, evicted)) = self.days.pop_front() {
                evicted.clear_neighbors();
                log::debug!("DayWindow: evicted day {}", evicted_date);
            }
            let insert_pos = insert_pos.saturating_sub(1);
            self.days.insert(insert_pos, (date, context));
        } else {
            self.days.insert(insert_pos, (date, context));
        }

        self.relink();
        log::debug!("DayWindow: inserted day {}, now have {} days", date, self.days.len());
    }

    /// Rewires previous/next weak links across all resident days. Links
    /// are only set between dates exactly one day apart.
    fn relink(&self) {
        for (_, context) in &self.days {
            context.clear_neighbors();
        }
        for i in 1..self.days.len() {
            let (left_date, left) = &self.days[i - 1];
            let (right_date, right) = &self.days[i];
            if *right_date == left_date.succ_opt().unwrap_or(*right_date) {
                left.set_next(Arc::downgrade(right));
                right.set_previous(Arc::downgrade(left));
            }
        }
    }

    /// Finishes a day's scan: clears its neighbor links and removes it
    /// from the window, then rewires the remaining days.
    pub fn retire(&mut self, date: NaiveDate) -> Option<Arc<DayContext>> {
        let pos = self.days.iter().position(|(d, _)| *d == date)?;
        let (_, context) = self.days.remove(pos)?;
        context.clear_neighbors();
        self.relink();
        Some(context)
    }

    /// Gets the context for the given date, if resident.
    pub fn get(&self, date: NaiveDate) -> Option<&Arc<DayContext>> {
        self.days.iter().find(|(d, _)| *d == date).map(|(_, c)| c)
    }

    /// The most recent resident day.
    pub fn current(&self) -> Option<&Arc<DayContext>> {
        self.days.back().map(|(_, c)| c)
    }

    /// Returns all resident dates (oldest to newest).
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.days.iter().map(|(d, _)| *d).collect()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Clears all resident days, unlinking each.
    pub fn clear(&mut self) {
        for (_, context) in &self.days {
            context.clear_neighbors();
        }
        log::debug!("DayWindow: clearing {} days", self.days.len());
        self.days.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::ContextBuilder;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn context_for(day: u32) -> Arc<DayContext> {
        ContextBuilder::new().date(date(day)).build()
    }

    #[test]
    fn test_advance_links_adjacent_days() {
        let mut window = DayWindow::new();
        let day1 = context_for(1);
        let day2 = context_for(2);
        window.advance(date(1), Arc::clone(&day1));
        window.advance(date(2), Arc::clone(&day2));

        assert_eq!(window.len(), 2);
        assert!(day1.next_day().is_some());
        assert!(day2.previous_day().is_some());
        assert!(day1.previous_day().is_none());
        assert!(day2.next_day().is_none());
    }

    #[test]
    fn test_non_adjacent_days_stay_unlinked() {
        let mut window = DayWindow::new();
        let day1 = context_for(1);
        let day3 = context_for(3);
        window.advance(date(1), Arc::clone(&day1));
        window.advance(date(3), Arc::clone(&day3));

        assert!(day1.next_day().is_none());
        assert!(day3.previous_day().is_none());
    }

    #[test]
    fn test_capacity_bounds_resident_set() {
        let mut window = DayWindow::new();
        let day1 = context_for(1);
        window.advance(date(1), Arc::clone(&day1));
        window.advance(date(2), context_for(2));
        window.advance(date(3), context_for(3));
        window.advance(date(4), context_for(4));

        assert_eq!(window.len(), 3);
        assert_eq!(window.dates(), vec![date(2), date(3), date(4)]);
        // The evicted day is unlinked so nothing keeps it alive.
        assert!(day1.next_day().is_none());
        assert!(window.get(date(1)).is_none());
    }

    #[test]
    fn test_older_than_all_is_dropped_at_capacity() {
        let mut window = DayWindow::new();
        window.advance(date(2), context_for(2));
        window.advance(date(3), context_for(3));
        window.advance(date(4), context_for(4));
        window.advance(date(1), context_for(1));

        assert_eq!(window.dates(), vec![date(2), date(3), date(4)]);
    }

    #[test]
    fn test_retire_clears_links() {
        let mut window = DayWindow::new();
        let day1 = context_for(1);
        let day2 = context_for(2);
        let day3 = context_for(3);
        window.advance(date(1), Arc::clone(&day1));
        window.advance(date(2), Arc::clone(&day2));
        window.advance(date(3), Arc::clone(&day3));

        let retired = window.retire(date(2)).unwrap();
        assert!(retired.previous_day().is_none());
        assert!(retired.next_day().is_none());
        assert_eq!(window.len(), 2);
        // Days 1 and 3 are not adjacent; they stay unlinked.
        assert!(day1.next_day().is_none());
        assert!(day3.previous_day().is_none());
    }

    #[test]
    fn test_boundary_query_through_window_links() {
        use crate::channel::Channel;
        use crate::engine::testutil::{day_buffer, TEST_DAY_START_MS};

        let d = TEST_DAY_START_MS; // midnight of 2024-05-01
        let day1 = ContextBuilder::new()
            .date(date(1))
            .buffer("00", "BHZ", day_buffer(d, 50, 1.0))
            .build();
        let day2 = ContextBuilder::new()
            .date(date(2))
            .buffer("00", "BHZ", day_buffer(d + 86_400_000, 50, 2.0))
            .build();

        let mut window = DayWindow::new();
        window.advance(date(1), day1);
        window.advance(date(2), Arc::clone(&day2));

        let boundary = d + 86_400_000;
        let data = day2
            .windowed_data(&Channel::new("00", "BHZ"), boundary - 100, boundary + 50)
            .unwrap();
        assert_eq!(data, vec![1.0, 1.0, 2.0]);
    }
}
