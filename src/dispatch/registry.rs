//! Pending call registry
//!
//! Growable arena of one-shot completion slots. Each in-flight call owns one
//! slot; the engine only ever sees the slot's [`CallRef`].
//!
//! ## Slot Lifecycle
//! ```text
//! Free(gen) ──register──▶ Pending(gen) ──complete/cancel/drain──▶ Free(gen+1)
//! ```
//! Bumping the generation on release makes any later use of the old
//! `CallRef` miss, so a slot is completed at most once per registration.

use std::fmt;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::error::{RelayError, Result};
use crate::protocol::{CommandResult, ErrorKind};

/// Integer token identifying one pending call across the engine boundary
///
/// Low 32 bits: slot index. High 32 bits: slot generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallRef(u64);

impl CallRef {
    pub fn new(index: u32, generation: u32) -> Self {
        Self((u64::from(generation) << 32) | u64::from(index))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }

    pub fn index(self) -> u32 {
        self.0 as u32
    }

    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Display for CallRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.index(), self.generation())
    }
}

/// Slot in the arena
enum Slot {
    Pending {
        generation: u32,
        sender: Sender<CommandResult>,
    },
    Free {
        generation: u32,
        next_free: Option<u32>,
    },
}

struct Arena {
    slots: Vec<Slot>,
    free_head: Option<u32>,
    outstanding: usize,
}

impl Arena {
    fn insert(&mut self, sender: Sender<CommandResult>) -> Result<CallRef> {
        if let Some(index) = self.free_head {
            if let Some(slot) = self.slots.get_mut(index as usize) {
                if let Slot::Free {
                    generation,
                    next_free,
                } = *slot
                {
                    *slot = Slot::Pending { generation, sender };
                    self.free_head = next_free;
                    self.outstanding += 1;
                    return Ok(CallRef::new(index, generation));
                }
            }
        }

        let index = u32::try_from(self.slots.len()).map_err(|_| {
            RelayError::Request("too many outstanding calls".to_string())
        })?;
        self.slots.push(Slot::Pending {
            generation: 0,
            sender,
        });
        self.outstanding += 1;
        Ok(CallRef::new(index, 0))
    }

    /// Release the slot for `call_ref` if it is still pending under that generation
    fn take(&mut self, call_ref: CallRef) -> Option<Sender<CommandResult>> {
        let index = call_ref.index();
        let slot = self.slots.get_mut(index as usize)?;

        let generation = match slot {
            Slot::Pending { generation, .. } if *generation == call_ref.generation() => *generation,
            _ => return None,
        };

        let released = std::mem::replace(
            slot,
            Slot::Free {
                generation: generation.wrapping_add(1),
                next_free: self.free_head,
            },
        );
        self.free_head = Some(index);
        self.outstanding -= 1;

        match released {
            Slot::Pending { sender, .. } => Some(sender),
            Slot::Free { .. } => None,
        }
    }
}

/// Thread-safe arena of pending calls
pub struct CallRegistry {
    arena: Mutex<Arena>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self {
            arena: Mutex::new(Arena {
                slots: Vec::new(),
                free_head: None,
                outstanding: 0,
            }),
        }
    }

    /// Allocate a slot and its one-shot channel
    pub fn register(&self) -> Result<PendingCall> {
        let (sender, receiver) = channel::bounded(1);
        let call_ref = self.arena.lock().insert(sender)?;
        Ok(PendingCall { call_ref, receiver })
    }

    /// Deliver the result for `call_ref`
    ///
    /// Fails with `UnknownCall` if the reference was never issued or its slot
    /// has already been completed or cancelled.
    pub fn complete(&self, call_ref: CallRef, result: CommandResult) -> Result<()> {
        // The sender leaves the arena under the lock; the send happens outside it.
        let sender = self
            .arena
            .lock()
            .take(call_ref)
            .ok_or(RelayError::UnknownCall(call_ref.as_raw()))?;

        if sender.send(result).is_err() {
            tracing::debug!(%call_ref, "caller stopped waiting before completion arrived");
        }
        Ok(())
    }

    /// Drop the slot without delivering anything
    ///
    /// Returns false if the call was already completed (or never existed).
    pub fn cancel(&self, call_ref: CallRef) -> bool {
        self.arena.lock().take(call_ref).is_some()
    }

    /// Release every pending slot, returning the senders still waiting
    pub fn drain(&self) -> Vec<(CallRef, Sender<CommandResult>)> {
        let mut arena = self.arena.lock();
        let pending: Vec<CallRef> = arena
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Pending { generation, .. } => Some(CallRef::new(index as u32, *generation)),
                Slot::Free { .. } => None,
            })
            .collect();

        pending
            .into_iter()
            .filter_map(|call_ref| arena.take(call_ref).map(|sender| (call_ref, sender)))
            .collect()
    }

    /// Number of calls currently waiting for a result
    pub fn outstanding(&self) -> usize {
        self.arena.lock().outstanding
    }

    /// Number of slots ever allocated (pending + free)
    pub fn capacity(&self) -> usize {
        self.arena.lock().slots.len()
    }
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The caller's half of a registered call
#[derive(Debug)]
pub struct PendingCall {
    call_ref: CallRef,
    receiver: Receiver<CommandResult>,
}

impl PendingCall {
    pub fn call_ref(&self) -> CallRef {
        self.call_ref
    }

    /// Block until the result arrives
    pub fn wait(self) -> CommandResult {
        self.receiver.recv().unwrap_or_else(|_| {
            CommandResult::error(
                ErrorKind::Closing,
                "call registry dropped before the call completed",
            )
        })
    }

    /// Block for at most `timeout`; `None` if nothing arrived in time
    pub fn wait_timeout(&self, timeout: Duration) -> Option<CommandResult> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(CommandResult::error(
                ErrorKind::Closing,
                "call registry dropped before the call completed",
            )),
        }
    }
}
