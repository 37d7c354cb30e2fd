// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Cipher Relay Contributors

//! # Event Extractor
//!
//! Converts the free-text log lines of one transaction batch into typed
//! [`BridgeEvent`]s. The upstream log text is the de facto wire protocol:
//! the substring markers below are the whole contract, and any upstream
//! phrasing change must be absorbed here and nowhere else.
//!
//! ## Grammar (v1)
//!
//! One batch yields zero or one event per grammar. Markers are searched
//! across the whole batch, not positionally.
//!
//! - **Deposit**: a line containing both `User` and `deposited`, plus a
//!   line containing `Deposit info:`. Owner and amount come from
//!   `User <owner> deposited <amount> lamports`; the handle is the JSON
//!   32-integer array after `Deposit info:`.
//! - **Transfer**: lines containing `Transferring`, `Sender's deposit
//!   value:` and `Recipient's deposit value:`. The amount handle sits
//!   between `Transferring ` and ` from`; the other two follow `value: `.
//! - **HomomorphicAdd**: lines containing `FHE Add - LHS:`,
//!   `FHE Add - RHS:` and `FHE addition result:`.
//!
//! A batch with a required line missing produces no event (silent drop,
//! the batch simply wasn't that kind of transaction). A batch with all
//! lines present but malformed content (bad JSON, array length ≠ 32,
//! non-numeric amount) is a recoverable parse failure: the event is
//! dropped with a warn diagnostic and never retried, since log content is
//! immutable.

use crate::models::{BridgeEvent, CiphertextHandle, RawLogBatch};

// Grammar v1 markers.
const DEPOSIT_USER_MARKER: &str = "User";
const DEPOSIT_VERB_MARKER: &str = "deposited";
const DEPOSIT_INFO_MARKER: &str = "Deposit info:";
const TRANSFER_MARKER: &str = "Transferring";
const TRANSFER_FROM_MARKER: &str = " from";
const SENDER_VALUE_MARKER: &str = "Sender's deposit value:";
const RECIPIENT_VALUE_MARKER: &str = "Recipient's deposit value:";
const VALUE_SPLIT_MARKER: &str = "value: ";
const ADD_LHS_MARKER: &str = "FHE Add - LHS:";
const ADD_RHS_MARKER: &str = "FHE Add - RHS:";
const ADD_RESULT_MARKER: &str = "FHE addition result:";

/// Extract every recognized event from one batch, in parse order:
/// Deposit, Transfer, HomomorphicAdd.
pub fn extract_events(batch: &RawLogBatch) -> Vec<BridgeEvent> {
    let mut events = Vec::new();
    if let Some(event) = extract_deposit(batch) {
        events.push(event);
    }
    if let Some(event) = extract_transfer(batch) {
        events.push(event);
    }
    if let Some(event) = extract_homomorphic_add(batch) {
        events.push(event);
    }
    events
}

fn extract_deposit(batch: &RawLogBatch) -> Option<BridgeEvent> {
    let deposit_line = find_line(batch, |line| {
        line.contains(DEPOSIT_USER_MARKER) && line.contains(DEPOSIT_VERB_MARKER)
    })?;
    let info_line = find_line(batch, |line| line.contains(DEPOSIT_INFO_MARKER))?;

    // Both lines are present, so this batch is a deposit; anything wrong
    // from here on is malformed content worth a diagnostic.
    let Some((owner, lamports)) = parse_deposit_line(deposit_line) else {
        tracing::warn!(
            signature = %batch.signature,
            line = deposit_line,
            "dropping deposit with malformed user/amount line"
        );
        return None;
    };

    let handle_text = info_line.split(DEPOSIT_INFO_MARKER).nth(1)?;
    let handle = match parse_handle_array(handle_text) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(
                signature = %batch.signature,
                marker = DEPOSIT_INFO_MARKER,
                error = %e,
                "dropping deposit with malformed handle"
            );
            return None;
        }
    };

    Some(BridgeEvent::Deposit {
        owner,
        lamports,
        handle,
    })
}

fn extract_transfer(batch: &RawLogBatch) -> Option<BridgeEvent> {
    let transfer_line = find_line(batch, |line| line.contains(TRANSFER_MARKER))?;
    let sender_line = find_line(batch, |line| line.contains(SENDER_VALUE_MARKER))?;
    let recipient_line = find_line(batch, |line| line.contains(RECIPIENT_VALUE_MARKER))?;

    let amount_handle = text_between(transfer_line, TRANSFER_MARKER, TRANSFER_FROM_MARKER)
        .ok_or(ArrayParseError::MissingBrackets)
        .and_then(parse_handle_array);
    let amount_handle = match amount_handle {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(
                signature = %batch.signature,
                marker = TRANSFER_MARKER,
                error = %e,
                "dropping transfer with malformed amount handle"
            );
            return None;
        }
    };

    let sender_handle = match parse_value_suffix(sender_line) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(
                signature = %batch.signature,
                marker = SENDER_VALUE_MARKER,
                error = %e,
                "dropping transfer with malformed sender handle"
            );
            return None;
        }
    };
    let recipient_handle = match parse_value_suffix(recipient_line) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(
                signature = %batch.signature,
                marker = RECIPIENT_VALUE_MARKER,
                error = %e,
                "dropping transfer with malformed recipient handle"
            );
            return None;
        }
    };

    Some(BridgeEvent::Transfer {
        amount_handle,
        sender_handle,
        recipient_handle,
    })
}

fn extract_homomorphic_add(batch: &RawLogBatch) -> Option<BridgeEvent> {
    let lhs_line = find_line(batch, |line| line.contains(ADD_LHS_MARKER))?;
    let rhs_line = find_line(batch, |line| line.contains(ADD_RHS_MARKER))?;
    let result_line = find_line(batch, |line| line.contains(ADD_RESULT_MARKER))?;

    let mut handles = [CiphertextHandle::ZERO; 3];
    for (slot, (line, marker)) in handles.iter_mut().zip([
        (lhs_line, ADD_LHS_MARKER),
        (rhs_line, ADD_RHS_MARKER),
        (result_line, ADD_RESULT_MARKER),
    ]) {
        let text = line.split(marker).nth(1)?;
        match parse_handle_array(text) {
            Ok(handle) => *slot = handle,
            Err(e) => {
                tracing::warn!(
                    signature = %batch.signature,
                    marker,
                    error = %e,
                    "dropping homomorphic add with malformed operand"
                );
                return None;
            }
        }
    }

    Some(BridgeEvent::HomomorphicAdd {
        lhs: handles[0],
        rhs: handles[1],
        result: handles[2],
    })
}

// =============================================================================
// Parsing Helpers
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
enum ArrayParseError {
    #[error("no bracketed array in text")]
    MissingBrackets,

    #[error("invalid JSON array: {0}")]
    InvalidJson(String),

    #[error("array has {0} elements, expected 32")]
    WrongLength(usize),
}

fn find_line<'a>(batch: &'a RawLogBatch, pred: impl Fn(&str) -> bool) -> Option<&'a str> {
    batch.logs.iter().map(String::as_str).find(|line| pred(line))
}

/// Parse `User <owner> deposited <amount> lamports` into owner and amount.
fn parse_deposit_line(line: &str) -> Option<(String, u64)> {
    let rest = line.split_once("User ")?.1;
    let (owner, rest) = rest.split_once(" deposited ")?;
    let (amount, _) = rest.split_once(" lamports")?;
    let lamports = amount.trim().parse::<u64>().ok()?;
    if owner.is_empty() {
        return None;
    }
    Some((owner.to_string(), lamports))
}

/// Decode the bracketed 32-integer JSON array inside `text` as a handle.
fn parse_handle_array(text: &str) -> Result<CiphertextHandle, ArrayParseError> {
    let start = text.find('[').ok_or(ArrayParseError::MissingBrackets)?;
    let end = text.rfind(']').ok_or(ArrayParseError::MissingBrackets)?;
    if end < start {
        return Err(ArrayParseError::MissingBrackets);
    }
    let array_text = &text[start..=end];
    let values: Vec<u8> = serde_json::from_str(array_text)
        .map_err(|e| ArrayParseError::InvalidJson(e.to_string()))?;
    CiphertextHandle::try_from(values.as_slice()).map_err(ArrayParseError::WrongLength)
}

/// Handle following a `value: ` split, shared by the sender and recipient
/// lines.
fn parse_value_suffix(line: &str) -> Result<CiphertextHandle, ArrayParseError> {
    let text = line
        .split(VALUE_SPLIT_MARKER)
        .nth(1)
        .ok_or(ArrayParseError::MissingBrackets)?;
    parse_handle_array(text)
}

/// Text strictly between the end of `start` and the next `end` marker.
fn text_between<'a>(line: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let after = line.split(start).nth(1)?;
    let (between, _) = after.split_once(end)?;
    Some(between)
}
