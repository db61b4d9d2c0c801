//! Flattening of the recorded call tree
//!
//! Each frame is reconciled in place before its children are visited:
//! - Memory word counts corrected to what the engine reported
//! - Gas costs backfilled from the gas of the next instruction
//! - Memory snapshots backfilled from the next instruction's growth
//! - Storage snapshots accumulated per storage context
//!
//! Children are reconciled as they are reached, so storage is merged in
//! program order across the whole transaction. The reconciled tree is then
//! flattened into the output records.

use alloy::primitives::Address;
use log::debug;
use revm::bytecode::opcode::REVERT;

use super::StorageSnapshots;
use crate::types::{
    CallFrame, ErrorMarker, StepRecord, StructLog, TraceConfig, TraceEntry, TraceResult, TxResult,
};

/// Builds the output of a finished transaction from its root frame
///
/// `storage` holds the snapshots accumulated so far and is updated in place.
pub(crate) fn flatten_trace(
    root: CallFrame,
    result: TxResult,
    storage: &mut StorageSnapshots,
    config: &TraceConfig,
) -> TraceResult {
    let context = root.address.unwrap_or_default();
    let entries = reconcile_frame(root, context, storage);

    let mut records = Vec::new();
    collect_records(entries, &mut records);

    let mut struct_logs: Vec<StructLog> = records
        .into_iter()
        .map(|record| StructLog::from_record(record, config))
        .collect();
    if result.status.is_out_of_gas() {
        if let Some(last) = struct_logs.last_mut() {
            last.error = Some(ErrorMarker::default());
        }
    }

    TraceResult {
        gas: result.gas_used,
        failed: !result.status.is_success(),
        return_value: result.return_value,
        struct_logs,
    }
}

/// Reconciles `frame` and its descendants, returning its entries
///
/// `context` is the address whose storage the frame's code operates on.
fn reconcile_frame(
    mut frame: CallFrame,
    context: Address,
    storage: &mut StorageSnapshots,
) -> Vec<TraceEntry> {
    correct_word_counts(&mut frame.entries);
    backfill_gas_costs(&mut frame.entries);
    backfill_memory(&mut frame.entries);

    frame
        .entries
        .into_iter()
        .map(|entry| match entry {
            TraceEntry::Step(mut record) => {
                merge_storage(&mut record, context, storage);
                TraceEntry::Step(record)
            }
            TraceEntry::Frame(mut child) => {
                // Delegated code keeps operating on the caller's storage.
                let child_context = if child.delegatecall {
                    context
                } else {
                    child.address.unwrap_or_default()
                };
                let address = child.address;
                let delegatecall = child.delegatecall;
                let result = child.result.take();
                TraceEntry::Frame(CallFrame {
                    address,
                    delegatecall,
                    entries: reconcile_frame(child, child_context, storage),
                    result,
                })
            }
        })
        .collect()
}

/// Pads memory snapshots to the word count the engine reported
fn correct_word_counts(entries: &mut [TraceEntry]) {
    for record in entries.iter_mut().filter_map(TraceEntry::as_step_mut) {
        let reported = usize::try_from(record.memory_word_count).unwrap_or(usize::MAX);
        if reported > record.memory.len() {
            debug!(
                "memory at pc {} holds {} words, engine reports {}, padding",
                record.pc,
                record.memory.len(),
                reported
            );
            record.pad_memory(reported);
        }
    }
}

/// Replaces static fees by the gas actually consumed
///
/// Only records directly followed by another record of the same frame are
/// updated, and never those whose cost was reconstructed.
fn backfill_gas_costs(entries: &mut [TraceEntry]) {
    for i in 0..entries.len().saturating_sub(1) {
        let Some(next_gas) = entries[i + 1].as_step().map(|next| next.gas) else {
            continue;
        };
        if let Some(record) = entries[i].as_step_mut() {
            if !record.gas_cost_reconstructed {
                record.gas_cost = record.gas.saturating_sub(next_gas);
            }
        }
    }
}

/// Pads a record's memory when the instruction after it grew memory
///
/// # Panics
/// When a nested frame is first in its parent or follows another nested frame.
fn backfill_memory(entries: &mut [TraceEntry]) {
    let mut previous: Option<usize> = None;
    for i in 0..entries.len() {
        let words = match &entries[i] {
            TraceEntry::Frame(_) => {
                assert!(
                    i > 0 && !entries[i - 1].is_frame(),
                    "nested call at entry {i} is not preceded by the instruction that issued it"
                );
                continue;
            }
            TraceEntry::Step(record) if record.opcode == REVERT => None,
            TraceEntry::Step(record) => Some(record.memory.len()),
        };
        if let (Some(words), Some(p)) = (words, previous) {
            if let Some(record) = entries[p].as_step_mut() {
                record.pad_memory(words);
            }
        }
        previous = Some(i);
    }
}

/// Merges the storage a record touched into its context's snapshot
///
/// The record then carries everything known for the context so far.
fn merge_storage(record: &mut StepRecord, context: Address, storage: &mut StorageSnapshots) {
    if record.storage.is_empty() {
        return;
    }
    let snapshot = storage.entry(context).or_default();
    snapshot.append(&mut record.storage);
    record.storage = snapshot.clone();
}

/// Appends the records of `entries` in execution order
fn collect_records(entries: Vec<TraceEntry>, records: &mut Vec<StepRecord>) {
    for entry in entries {
        match entry {
            TraceEntry::Step(record) => records.push(record),
            TraceEntry::Frame(frame) => collect_records(frame.entries, records),
        }
    }
}
