// src/core/aggregate/groups.rs

//! Recomputes group-aggregate rows.
//!
//! A group row (empty remote command) aggregates the contiguous run of
//! non-group rows immediately following it: worst connect status, summed
//! numeric counters, element-wise maximum of the log histories. Groups own
//! no polling client; this pass is their only writer.

use crate::core::constants::MAX_LOG_HISTORY;
use crate::core::status::record::SiteRecord;
use crate::core::status::{LogHistoryKind, StatusArea};

/// One pass over the area. Runs on supervisor idle, once per rescan tick.
pub fn recompute_groups(area: &StatusArea) {
    let records = area.records();
    let mut index = 0;
    while index < records.len() {
        if !records[index].lock().is_group() {
            index += 1;
            continue;
        }

        let mut aggregate = GroupAggregate::default();
        let mut member = index + 1;
        while member < records.len() {
            let record = records[member].lock();
            if record.is_group() {
                break;
            }
            aggregate.absorb(&record);
            drop(record);
            member += 1;
        }

        aggregate.store(&mut records[index].lock());
        index = member;
    }
}

struct GroupAggregate {
    connect_status: u8,
    amg_status: i32,
    fd_status: i32,
    archive_watch_status: i32,
    fc: u32,
    fs: u64,
    tr: u64,
    fr: u32,
    ec: u32,
    host_error_counter: u32,
    no_of_transfers: u32,
    jobs_in_queue: u32,
    log_history: [[u8; MAX_LOG_HISTORY]; 3],
}

impl Default for GroupAggregate {
    fn default() -> Self {
        Self {
            connect_status: 0,
            amg_status: 0,
            fd_status: 0,
            archive_watch_status: 0,
            fc: 0,
            fs: 0,
            tr: 0,
            fr: 0,
            ec: 0,
            host_error_counter: 0,
            no_of_transfers: 0,
            jobs_in_queue: 0,
            log_history: [[0; MAX_LOG_HISTORY]; 3],
        }
    }
}

impl GroupAggregate {
    fn absorb(&mut self, record: &SiteRecord) {
        self.connect_status = self.connect_status.max(record.connect_status as u8);
        self.amg_status = self.amg_status.max(record.amg_status);
        self.fd_status = self.fd_status.max(record.fd_status);
        self.archive_watch_status = self
            .archive_watch_status
            .max(record.archive_watch_status);
        self.fc = self.fc.saturating_add(record.fc);
        self.fs = self.fs.saturating_add(record.fs);
        self.tr = self.tr.saturating_add(record.tr);
        self.fr = self.fr.saturating_add(record.fr);
        self.ec = self.ec.saturating_add(record.ec);
        self.host_error_counter = self
            .host_error_counter
            .saturating_add(record.host_error_counter);
        self.no_of_transfers = self.no_of_transfers.saturating_add(record.no_of_transfers);
        self.jobs_in_queue = self.jobs_in_queue.saturating_add(record.jobs_in_queue);

        for kind in [
            LogHistoryKind::Receive,
            LogHistoryKind::Transfer,
            LogHistoryKind::System,
        ] {
            let history = record.history(kind);
            for (slot, &value) in self.log_history[kind as usize].iter_mut().zip(history) {
                *slot = (*slot).max(value);
            }
        }
    }

    fn store(self, group: &mut SiteRecord) {
        use crate::core::status::ConnectStatus;
        group.connect_status =
            ConnectStatus::from_repr(self.connect_status).unwrap_or(group.connect_status);
        group.amg_status = self.amg_status;
        group.fd_status = self.fd_status;
        group.archive_watch_status = self.archive_watch_status;
        group.fc = self.fc;
        group.fs = self.fs;
        group.tr = self.tr;
        group.fr = self.fr;
        group.ec = self.ec;
        group.host_error_counter = self.host_error_counter;
        group.no_of_transfers = self.no_of_transfers;
        group.jobs_in_queue = self.jobs_in_queue;
        group.log_history = self.log_history;
        group.seqno = group.seqno.wrapping_add(1);
    }
}
