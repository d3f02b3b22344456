// src/core/status/supervisor_status.rs

//! The supervisor-wide status record: process start time, the severity of
//! each auxiliary log writer, and the monitor-wide log counters.

use crate::core::FleetMonError;
use crate::core::constants::{LOG_FIFO_SIZE, NO_INFORMATION};
use crate::core::status::record::CounterRing;
use bytes::{Buf, BufMut, BytesMut};
use crc::{CRC_64_XZ, Crc};
use std::path::Path;

const STATUS_MAGIC: &[u8] = b"FLMNSTAT";
const CHECKSUM_ALGO: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

const RUN_ID_LENGTH: usize = 40;

#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorStatus {
    pub start_time: i64,
    pub run_id: String,
    /// Worst severity seen by the system log writer since startup.
    pub system_log_severity: u8,
    /// Worst severity seen by the monitor log writer since startup.
    pub monitor_log_severity: u8,
    pub log_fifo: [u8; LOG_FIFO_SIZE],
    pub log_entry_counter: u32,
    pub log_bytes_received: CounterRing,
}

impl SupervisorStatus {
    pub fn new(start_time: i64, run_id: String) -> Self {
        Self {
            start_time,
            run_id,
            system_log_severity: NO_INFORMATION,
            monitor_log_severity: NO_INFORMATION,
            log_fifo: [NO_INFORMATION; LOG_FIFO_SIZE],
            log_entry_counter: 0,
            log_bytes_received: CounterRing::default(),
        }
    }

    pub fn note_severity(&mut self, monitor_stream: bool, severity: u8) {
        let slot = if monitor_stream {
            &mut self.monitor_log_severity
        } else {
            &mut self.system_log_severity
        };
        *slot = (*slot).max(severity);
        self.log_fifo.copy_within(1.., 0);
        self.log_fifo[LOG_FIFO_SIZE - 1] = severity;
        self.log_entry_counter = self.log_entry_counter.wrapping_add(1);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(
            STATUS_MAGIC.len() + 8 + RUN_ID_LENGTH + 2 + LOG_FIFO_SIZE + 4 + 6 * 8 + 8,
        );
        buf.put_slice(STATUS_MAGIC);
        buf.put_i64(self.start_time);
        let id = self.run_id.as_bytes();
        let n = id.len().min(RUN_ID_LENGTH);
        buf.put_slice(&id[..n]);
        buf.put_bytes(0, RUN_ID_LENGTH - n);
        buf.put_u8(self.system_log_severity);
        buf.put_u8(self.monitor_log_severity);
        buf.put_slice(&self.log_fifo);
        buf.put_u32(self.log_entry_counter);
        for slot in self.log_bytes_received.slots {
            buf.put_u64(slot);
        }
        let crc = CHECKSUM_ALGO.checksum(&buf);
        buf.put_u64(crc);
        buf.to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FleetMonError> {
        let expected =
            STATUS_MAGIC.len() + 8 + RUN_ID_LENGTH + 2 + LOG_FIFO_SIZE + 4 + 6 * 8 + 8;
        if bytes.len() != expected {
            return Err(FleetMonError::StatusAreaError(
                "Supervisor status file has the wrong size".into(),
            ));
        }
        let (body, trailer) = bytes.split_at(bytes.len() - 8);
        let stored_crc = u64::from_be_bytes(trailer.try_into().expect("8-byte trailer"));
        if CHECKSUM_ALGO.checksum(body) != stored_crc {
            return Err(FleetMonError::StatusAreaError(
                "Supervisor status checksum mismatch".into(),
            ));
        }

        let mut cursor = body;
        if &cursor[..STATUS_MAGIC.len()] != STATUS_MAGIC {
            return Err(FleetMonError::StatusAreaError("Bad magic".into()));
        }
        cursor.advance(STATUS_MAGIC.len());
        let start_time = cursor.get_i64();
        let raw_id = &cursor[..RUN_ID_LENGTH];
        let end = raw_id.iter().position(|&b| b == 0).unwrap_or(RUN_ID_LENGTH);
        let run_id = String::from_utf8_lossy(&raw_id[..end]).into_owned();
        cursor.advance(RUN_ID_LENGTH);
        let system_log_severity = cursor.get_u8();
        let monitor_log_severity = cursor.get_u8();
        let mut log_fifo = [0u8; LOG_FIFO_SIZE];
        cursor.copy_to_slice(&mut log_fifo);
        let log_entry_counter = cursor.get_u32();
        let mut log_bytes_received = CounterRing::default();
        for slot in &mut log_bytes_received.slots {
            *slot = cursor.get_u64();
        }

        Ok(Self {
            start_time,
            run_id,
            system_log_severity,
            monitor_log_severity,
            log_fifo,
            log_entry_counter,
            log_bytes_received,
        })
    }

    pub async fn write_to(&self, path: &Path) -> Result<(), FleetMonError> {
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, self.encode()).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}
