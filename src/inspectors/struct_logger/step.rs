//! Instruction records with reconstructed gas costs
//!
//! The engine reports the static fee of every opcode. For the opcodes below
//! the reference trace shows more than that, so the cost is rebuilt from the
//! reported stack:
//!
//! | Opcode | Reconstruction |
//! |---|---|
//! | SLOAD | loaded value recorded as touched storage |
//! | SSTORE | written value recorded as touched storage |
//! | REVERT | fee plus memory expansion, memory padded to the new size |
//! | CREATE2 | fee plus hashing surcharge for the init code |
//! | CALL, STATICCALL, DELEGATECALL | constant plus dynamic call gas |
//! | CALLCODE | rejected |

use std::collections::BTreeMap;
use std::iter::Rev;
use std::slice::Iter;

use alloy::primitives::{Address, B256, U256};
use revm::bytecode::opcode::{CALL, CALLCODE, CREATE2, DELEGATECALL, REVERT, SLOAD, SSTORE, STATICCALL};

use super::StructLogger;
use crate::{
    errors::TraceError,
    traits::{GasSchedule, StateReader},
    types::{memory_words, StepRecord, StepSnapshot},
    utils::gas_utils::{
        forwarded_gas, keccak_word_cost, memory_end, memory_expansion_cost, words_for, GasParam,
    },
};

/// Reads instruction arguments from a stack snapshot, top first
///
/// Arguments missing from an underflowing stack read as zero.
struct StackArgs<'a> {
    items: Rev<Iter<'a, U256>>,
}

impl<'a> StackArgs<'a> {
    fn new(stack: &'a [U256]) -> Self {
        Self {
            items: stack.iter().rev(),
        }
    }

    fn pop(&mut self) -> U256 {
        self.items.next().copied().unwrap_or_default()
    }

    fn pop_word(&mut self) -> B256 {
        B256::from(self.pop())
    }

    fn pop_address(&mut self) -> Address {
        Address::from_word(self.pop_word())
    }
}

/// Arguments of CALL, STATICCALL and DELEGATECALL
#[derive(Debug, Clone, Copy)]
struct CallArgs {
    gas: U256,
    to: Address,
    value: U256,
    in_offset: U256,
    in_size: U256,
    out_offset: U256,
    out_size: U256,
}

impl CallArgs {
    fn pop(args: &mut StackArgs<'_>, has_value: bool) -> Self {
        let gas = args.pop();
        let to = args.pop_address();
        let value = if has_value { args.pop() } else { U256::ZERO };
        Self {
            gas,
            to,
            value,
            in_offset: args.pop(),
            in_size: args.pop(),
            out_offset: args.pop(),
            out_size: args.pop(),
        }
    }

    /// Memory end touched by input or output, whichever is larger
    fn memory_end(&self) -> u64 {
        memory_end(self.in_offset, self.in_size).max(memory_end(self.out_offset, self.out_size))
    }
}

impl<S, G> StructLogger<S, G>
where
    S: StateReader,
    G: GasSchedule,
{
    /// Builds the instruction record for `snapshot`
    ///
    /// Suspends on the state reads SLOAD and value-transferring calls need.
    pub(crate) async fn build_step(&self, snapshot: StepSnapshot) -> Result<StepRecord, TraceError> {
        let StepSnapshot {
            pc,
            opcode,
            fee,
            gas_left,
            memory_word_count,
            stack,
            memory,
            address,
            depth,
        } = snapshot;

        let mut record = StepRecord {
            pc,
            opcode,
            gas: gas_left,
            gas_cost: fee,
            depth: depth + 1,
            stack: Vec::new(),
            memory: memory_words(&memory),
            storage: BTreeMap::new(),
            memory_word_count,
            gas_cost_reconstructed: false,
        };
        let current_words = (record.memory.len() as u64).max(memory_word_count);
        let mut args = StackArgs::new(&stack);

        match opcode {
            SLOAD => {
                let key = args.pop_word();
                let value = self.load_storage(address, key).await?;
                record.storage.insert(key, value);
            }
            SSTORE => {
                let key = args.pop_word();
                let value = args.pop_word();
                record.storage.insert(key, value);
            }
            REVERT => {
                let offset = args.pop();
                let size = args.pop();
                let words = words_for(memory_end(offset, size));
                let expansion = memory_expansion_cost(&self.gas, current_words, words);
                record.gas_cost = fee.saturating_add(expansion);
                record.gas_cost_reconstructed = true;
                // An unaffordable expansion halts the engine before memory grows.
                if record.gas_cost <= gas_left {
                    record.pad_memory(usize::try_from(words).unwrap_or(usize::MAX));
                }
            }
            CREATE2 => {
                let _value = args.pop();
                let _offset = args.pop();
                let size = args.pop();
                record.gas_cost = fee.saturating_add(keccak_word_cost(&self.gas, size.saturating_to()));
                record.gas_cost_reconstructed = true;
            }
            CALL | STATICCALL | DELEGATECALL => {
                let call = CallArgs::pop(&mut args, opcode == CALL);
                record.gas_cost = self.call_gas_cost(&call, gas_left, current_words).await?;
                record.gas_cost_reconstructed = true;
            }
            CALLCODE => {
                return Err(TraceError::InvalidInput(format!(
                    "CALLCODE at pc {pc} is not supported"
                )));
            }
            _ => {}
        }

        record.stack = stack;
        Ok(record)
    }

    /// Current value of `key` in the storage of `address`
    ///
    /// Writes made earlier in the transaction take precedence over the state
    /// accessor, which only knows the state before the transaction.
    async fn load_storage(&self, address: Address, key: B256) -> Result<B256, TraceError> {
        if let Some(value) = self.written.get(&address).and_then(|slots| slots.get(&key)) {
            return Ok(*value);
        }
        self.state
            .storage(address, key)
            .await
            .map_err(|e| TraceError::StateAccess(e.to_string()))
    }

    /// Total gas charged by a call-family instruction
    ///
    /// Constant call gas plus the dynamic part: new-account and value-transfer
    /// surcharges, memory expansion and the gas forwarded to the callee.
    async fn call_gas_cost(
        &self,
        call: &CallArgs,
        gas_left: u64,
        current_words: u64,
    ) -> Result<u64, TraceError> {
        let constant = self.gas.gas_param(GasParam::Call);
        let available = gas_left.saturating_sub(constant);
        let expansion =
            memory_expansion_cost(&self.gas, current_words, words_for(call.memory_end()));

        let mut dynamic = 0u64;
        if !call.value.is_zero() {
            let target_empty = !self.funded.contains(&call.to)
                && self
                    .state
                    .is_empty(call.to)
                    .await
                    .map_err(|e| TraceError::StateAccess(e.to_string()))?;
            if target_empty {
                dynamic = dynamic.saturating_add(self.gas.gas_param(GasParam::CallNewAccount));
            }
            dynamic = dynamic.saturating_add(self.gas.gas_param(GasParam::CallValueTransfer));
        }
        dynamic = dynamic.saturating_add(expansion);
        dynamic = dynamic.saturating_add(forwarded_gas(available.saturating_sub(dynamic), call.gas));

        Ok(constant.saturating_add(dynamic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        types::Bytes,
        utils::{gas_utils::GasParams, state_utils::InMemoryState},
    };
    use alloy::primitives::address;

    const CONTRACT: Address = address!("cafe00000000000000000000000000000000face");
    const CALLEE: Address = address!("dead00000000000000000000000000000000dead");

    fn snapshot(opcode: u8, fee: u64, gas_left: u64, stack: Vec<U256>) -> StepSnapshot {
        StepSnapshot {
            pc: 10,
            opcode,
            fee,
            gas_left,
            stack,
            address: CONTRACT,
            ..Default::default()
        }
    }

    fn build(logger: &StructLogger<InMemoryState>, snapshot: StepSnapshot) -> StepRecord {
        tokio_test::block_on(logger.build_step(snapshot)).unwrap()
    }

    /// Stack for a call-family instruction, arguments given top first
    fn call_stack(args: &[U256]) -> Vec<U256> {
        args.iter().rev().copied().collect()
    }

    #[test]
    fn test_plain_step_keeps_fee() {
        let logger = StructLogger::new(InMemoryState::new());
        let mut step = snapshot(0x01, 3, 1000, vec![U256::from(1), U256::from(2)]);
        step.depth = 2;
        step.memory = Bytes::from(vec![0u8; 64]);
        let record = build(&logger, step);
        assert_eq!(record.gas_cost, 3);
        assert_eq!(record.depth, 3);
        assert_eq!(record.memory.len(), 2);
        assert_eq!(record.stack, vec![U256::from(1), U256::from(2)]);
        assert!(!record.gas_cost_reconstructed);
        assert!(record.storage.is_empty());
    }

    #[test]
    fn test_sload_reads_storage() {
        let key = B256::with_last_byte(3);
        let state = InMemoryState::new().with_storage(CONTRACT, key, B256::with_last_byte(9));
        let logger = StructLogger::new(state);

        let record = build(&logger, snapshot(SLOAD, 100, 5000, vec![U256::from(3)]));
        assert_eq!(record.storage.get(&key), Some(&B256::with_last_byte(9)));
        assert_eq!(record.gas_cost, 100);
        assert!(!record.gas_cost_reconstructed);
    }

    #[test]
    fn test_sstore_records_write() {
        let logger = StructLogger::new(InMemoryState::new());
        // value pushed first, key on top
        let record = build(&logger, snapshot(SSTORE, 0, 30000, vec![U256::from(5), U256::from(1)]));
        assert_eq!(
            record.storage.get(&B256::with_last_byte(1)),
            Some(&B256::with_last_byte(5))
        );
    }

    #[test]
    fn test_revert_expands_memory() {
        let logger = StructLogger::new(InMemoryState::new());
        // offset 0, size 64 on an empty memory
        let record = build(&logger, snapshot(REVERT, 0, 1000, vec![U256::from(64), U256::ZERO]));
        assert_eq!(record.gas_cost, 6);
        assert_eq!(record.memory, vec![B256::ZERO; 2]);
        assert!(record.gas_cost_reconstructed);

        // zero size never expands
        let record = build(&logger, snapshot(REVERT, 0, 1000, vec![U256::ZERO, U256::from(4096)]));
        assert_eq!(record.gas_cost, 0);
        assert!(record.memory.is_empty());
    }

    #[test]
    fn test_revert_unaffordable_expansion_keeps_memory() {
        let logger = StructLogger::new(InMemoryState::new());
        let record = build(&logger, snapshot(REVERT, 0, 10, vec![U256::MAX, U256::ZERO]));
        assert!(record.memory.is_empty());
        assert!(record.gas_cost > 10);
    }

    #[test]
    fn test_create2_hashing_surcharge() {
        let logger = StructLogger::new(InMemoryState::new());
        // value, offset, size, salt from the top: salt pushed first
        let stack = call_stack(&[U256::ZERO, U256::ZERO, U256::from(65), U256::from(1)]);
        let record = build(&logger, snapshot(CREATE2, 32000, 100000, stack));
        assert_eq!(record.gas_cost, 32000 + 3 * 6);
        assert!(record.gas_cost_reconstructed);
    }

    #[test]
    fn test_call_without_value() {
        let logger = StructLogger::new(InMemoryState::new());
        let stack = call_stack(&[
            U256::MAX,
            U256::from_be_slice(CALLEE.as_slice()),
            U256::ZERO,
            U256::ZERO,
            U256::ZERO,
            U256::ZERO,
            U256::ZERO,
        ]);
        let record = build(&logger, snapshot(CALL, 700, 100_700, stack));
        // 700 constant, then all but one 64th of the remaining 100000
        assert_eq!(record.gas_cost, 700 + 100_000 - 100_000 / 64);
        assert!(record.gas_cost_reconstructed);
    }

    #[test]
    fn test_call_with_value_to_empty_account() {
        let logger = StructLogger::new(InMemoryState::new());
        let stack = call_stack(&[
            U256::from(1000),
            U256::from_be_slice(CALLEE.as_slice()),
            U256::from(1),
            U256::ZERO,
            U256::from(32),
            U256::from(32),
            U256::from(32),
        ]);
        let record = build(&logger, snapshot(CALL, 700, 100_000, stack));
        // output region ends at byte 64: two words of fresh memory cost 6
        assert_eq!(record.gas_cost, 700 + 25000 + 9000 + 6 + 1000);
    }

    #[test]
    fn test_call_with_value_to_existing_account() {
        let state = InMemoryState::new().with_account(CALLEE);
        let logger = StructLogger::new(state);
        let stack = call_stack(&[
            U256::from(1000),
            U256::from_be_slice(CALLEE.as_slice()),
            U256::from(1),
            U256::ZERO,
            U256::ZERO,
            U256::ZERO,
            U256::ZERO,
        ]);
        let record = build(&logger, snapshot(CALL, 700, 100_000, stack));
        assert_eq!(record.gas_cost, 700 + 9000 + 1000);
    }

    #[test]
    fn test_delegatecall_has_no_value_argument() {
        let logger = StructLogger::with_gas_schedule(
            InMemoryState::new(),
            GasParams::new().with(GasParam::Call, 100),
        );
        // gas, to, in offset, in size, out offset, out size
        let stack = call_stack(&[
            U256::from(5000),
            U256::from_be_slice(CALLEE.as_slice()),
            U256::from(1),
            U256::from(1),
            U256::ZERO,
            U256::ZERO,
        ]);
        let record = build(&logger, snapshot(DELEGATECALL, 100, 10_000, stack));
        // input region [1, 2) needs one word
        assert_eq!(record.gas_cost, 100 + 3 + 5000);
    }

    #[test]
    fn test_callcode_is_rejected() {
        let logger = StructLogger::new(InMemoryState::new());
        let result = tokio_test::block_on(logger.build_step(snapshot(CALLCODE, 700, 10_000, Vec::new())));
        assert!(matches!(result, Err(TraceError::InvalidInput(_))));
    }

    #[test]
    fn test_sload_prefers_earlier_write() {
        let key = B256::with_last_byte(1);
        let state = InMemoryState::new().with_storage(CONTRACT, key, B256::with_last_byte(9));
        let mut logger = StructLogger::new(state);
        logger
            .written
            .entry(CONTRACT)
            .or_default()
            .insert(key, B256::with_last_byte(5));

        let record = build(&logger, snapshot(SLOAD, 100, 5000, vec![U256::from(1)]));
        assert_eq!(record.storage.get(&key), Some(&B256::with_last_byte(5)));

        // other contexts still read through the accessor
        let mut elsewhere = snapshot(SLOAD, 100, 5000, vec![U256::from(1)]);
        elsewhere.address = CALLEE;
        let record = build(&logger, elsewhere);
        assert_eq!(record.storage.get(&key), Some(&B256::ZERO));
    }

    #[test]
    fn test_call_with_value_to_funded_account() {
        let mut logger = StructLogger::new(InMemoryState::new());
        logger.funded.insert(CALLEE);
        let stack = call_stack(&[
            U256::from(1000),
            U256::from_be_slice(CALLEE.as_slice()),
            U256::from(1),
            U256::ZERO,
            U256::ZERO,
            U256::ZERO,
            U256::ZERO,
        ]);
        let record = build(&logger, snapshot(CALL, 700, 100_000, stack));
        assert_eq!(record.gas_cost, 700 + 9000 + 1000);
    }

    #[test]
    fn test_revert_expansion_unaffordable_with_fee() {
        let logger = StructLogger::new(InMemoryState::new());
        // one fresh word costs 3, affordable alone but not on top of the fee
        let record = build(&logger, snapshot(REVERT, 3, 5, vec![U256::from(32), U256::ZERO]));
        assert_eq!(record.gas_cost, 6);
        assert!(record.memory.is_empty());
    }
}
