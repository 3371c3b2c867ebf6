// Copyright 2024-2026 SCAudit Contributors
// SPDX-License-Identifier: Apache-2.0

//! Vulnerability label set.
//!
//! The position of a label in [`LABELS`] is the contract with the classifier
//! head: logit `i` of every forward pass scores label `i`.

use std::fmt;

/// One vulnerability category the classifier scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelDescriptor {
    pub name: &'static str,
    pub rationale: &'static str,
}

impl LabelDescriptor {
    /// Published form, `"{name}: {rationale}"`.
    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LabelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.rationale)
    }
}

/// Ordered, immutable label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelSet {
    labels: &'static [LabelDescriptor],
}

impl LabelSet {
    pub const fn new(labels: &'static [LabelDescriptor]) -> Self {
        Self { labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&LabelDescriptor> {
        self.labels.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelDescriptor> {
        self.labels.iter()
    }

    /// Published label strings, in index order.
    pub fn texts(&self) -> Vec<String> {
        self.labels.iter().map(LabelDescriptor::text).collect()
    }
}

/// Number of outputs the classification head must produce.
pub const LABEL_COUNT: usize = 7;

const DESCRIPTORS: [LabelDescriptor; LABEL_COUNT] = [
    LabelDescriptor {
        name: "Unhandled Exception (Unchecked Call Return Value)",
        rationale: "Failing to check the return value of external calls (e.g., send(), call()), which may cause unexpected behavior if the call fails.",
    },
    LabelDescriptor {
        name: "Authorization through tx.origin",
        rationale: "Using tx.origin for authorization checks, which can be exploited by malicious contracts forwarding transactions.",
    },
    LabelDescriptor {
        name: "Reentrancy",
        rationale: "Allowing an external contract to re-enter the function before state updates are completed, potentially draining funds.",
    },
    LabelDescriptor {
        name: "Arithmetic (Integer Overflow and Underflow)",
        rationale: "Lack of overflow/underflow checks in arithmetic operations, leading to incorrect results or exploits.",
    },
    LabelDescriptor {
        name: "Timestamp Ordering (Transaction Order Dependence)",
        rationale: "Logic depending on transaction order or block timestamp, which can be manipulated by miners.",
    },
    LabelDescriptor {
        name: "Locked Ether",
        rationale: "Ether sent to a contract cannot be withdrawn because there is no withdrawal function or self-destruct.",
    },
    LabelDescriptor {
        name: "Time Manipulation (Block values as a proxy for time)",
        rationale: "Directly relying on block.timestamp or block.number as time sources, which miners can slightly alter.",
    },
];

/// The smart contract vulnerability labels, in classifier-head order.
pub static LABELS: LabelSet = LabelSet::new(&DESCRIPTORS);
