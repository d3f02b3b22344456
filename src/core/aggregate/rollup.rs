// src/core/aggregate/rollup.rs

//! The periodic counter roll-up.
//!
//! On each hour boundary the aggregator rebases ring slot 1 of every counter
//! and logs the hourly deltas; day, week, month and year slots follow when
//! the calendar field of the new hour differs from the stored one. At UTC
//! midnight the top-N arrays rotate one slot. A current counter below its
//! baseline means the remote counter rolled over: that period's delta is
//! zero by definition.

use crate::core::status::record::SiteRecord;
use crate::core::status::{RingSlot, StatusArea};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Timelike, Utc};
use tracing::{info, warn};

pub struct Rollup {
    next_hour: DateTime<Utc>,
    current_day: NaiveDate,
    current_week: (i32, u32),
    current_month: (i32, u32),
    current_year: i32,
}

#[derive(Default)]
struct Totals {
    files_send: u64,
    bytes_send: u64,
    files_received: u64,
    bytes_received: u64,
    connections: u64,
    total_errors: u64,
    log_bytes_received: u64,
}

impl Rollup {
    pub fn new(now: DateTime<Utc>) -> Self {
        let hour_start = now
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .expect("hour truncation is always valid");
        let date = now.date_naive();
        Self {
            next_hour: hour_start + ChronoDuration::hours(1),
            current_day: date,
            current_week: (date.iso_week().year(), date.iso_week().week()),
            current_month: (date.year(), date.month()),
            current_year: date.year(),
        }
    }

    /// When the next scheduled boundary fires. The supervisor uses this to
    /// size its idle timeout.
    pub fn next_boundary(&self) -> DateTime<Utc> {
        self.next_hour
    }

    /// Runs all roll-ups that have come due. Called from the supervisor's
    /// idle tick; a no-op before the next hour boundary.
    pub fn tick(&mut self, area: &StatusArea, now: DateTime<Utc>) {
        if now < self.next_hour {
            return;
        }

        let boundary_date = self.next_hour.date_naive();
        let mut slots = vec![RingSlot::Hour];
        if boundary_date != self.current_day {
            slots.push(RingSlot::Day);
        }
        let week = (boundary_date.iso_week().year(), boundary_date.iso_week().week());
        if week != self.current_week {
            slots.push(RingSlot::Week);
        }
        let month = (boundary_date.year(), boundary_date.month());
        if month != self.current_month {
            slots.push(RingSlot::Month);
        }
        if boundary_date.year() != self.current_year {
            slots.push(RingSlot::Year);
        }

        let rotate_tops = slots.contains(&RingSlot::Day);

        for &slot in &slots {
            let mut totals = Totals::default();
            for record in area.records() {
                let mut record = record.lock();
                if record.is_group() {
                    continue;
                }
                roll_site(&mut record, slot, &mut totals);
            }
            info!(
                "total {slot}: fs={} bs={} fr={} br={} con={} err={} lb={}",
                totals.files_send,
                totals.bytes_send,
                totals.files_received,
                totals.bytes_received,
                totals.connections,
                totals.total_errors,
                totals.log_bytes_received,
            );
        }

        if rotate_tops {
            for record in area.records() {
                let mut record = record.lock();
                if record.is_group() {
                    continue;
                }
                record.rotate_tops();
            }
            info!("Rotated top arrays at UTC midnight.");
        }

        self.current_day = boundary_date;
        self.current_week = week;
        self.current_month = month;
        self.current_year = boundary_date.year();
        while self.next_hour <= now {
            self.next_hour += ChronoDuration::hours(1);
        }
    }
}

/// Rebases one site's rings against `slot` and logs the per-site summary.
fn roll_site(record: &mut SiteRecord, slot: RingSlot, totals: &mut Totals) {
    let mut overflowed = false;
    let mut take = |ring: &mut crate::core::status::CounterRing| {
        let (delta, rolled) = ring.take_delta(slot);
        overflowed |= rolled;
        delta
    };

    let files_send = take(&mut record.files_send);
    let bytes_send = take(&mut record.bytes_send);
    let files_received = take(&mut record.files_received);
    let bytes_received = take(&mut record.bytes_received);
    let connections = take(&mut record.connections);
    let total_errors = take(&mut record.total_errors);
    let log_bytes_received = take(&mut record.log_bytes_received);

    if overflowed {
        warn!(
            "Counter overflowed on '{}' during the {slot} period, delta forced to zero.",
            record.alias
        );
    }

    info!(
        "{} {slot}: fs={files_send} bs={bytes_send} fr={files_received} br={bytes_received} con={connections} err={total_errors} lb={log_bytes_received}",
        record.alias,
    );

    totals.files_send += files_send;
    totals.bytes_send += bytes_send;
    totals.files_received += files_received;
    totals.bytes_received += bytes_received;
    totals.connections += connections;
    totals.total_errors += total_errors;
    totals.log_bytes_received += log_bytes_received;

    record.seqno = record.seqno.wrapping_add(1);
}
