// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Atomic transaction group composition: ARC-4 method calls, payments,
//! group-id assignment, and the simulate / execute paths.

use serde_bytes::ByteBuf;
use tracing::debug;

use crate::{
    abi::{self, AbiMethod, AbiType, AbiValue, RETURN_PREFIX},
    address::Address,
    client::{AlgodClient, SimulateConfig, SimulateGroupResult, SuggestedParams},
    error::AlgodError,
    signing::TransactionSigner,
    transactions::{
        assign_group_id, SignedTransaction, Transaction, TransactionType, WireBoxReference,
        ON_COMPLETE_NOOP,
    },
};

/// A box reference by application id; resolved to the wire index form at
/// composition time. App id 0 refers to the called application.
#[derive(Clone, Debug)]
pub struct AppBoxReference {
    pub app_id: u64,
    pub name: Vec<u8>,
}

impl AppBoxReference {
    pub fn new(app_id: u64, name: Vec<u8>) -> Self {
        Self { app_id, name }
    }

    /// An empty reference, used to widen box read/write quota.
    pub fn extra_io() -> Self {
        Self {
            app_id: 0,
            name: Vec::new(),
        }
    }
}

/// One ARC-4 argument: either an encodable value or a transaction that
/// must immediately precede the call in the group.
#[derive(Clone, Debug)]
pub enum MethodArg {
    Value(AbiValue),
    Transaction(Transaction),
}

/// Everything needed to append one method call to a group.
#[derive(Clone, Debug)]
pub struct MethodCallParams {
    pub app_id: u64,
    pub method: AbiMethod,
    pub args: Vec<MethodArg>,
    pub foreign_apps: Vec<u64>,
    pub foreign_assets: Vec<u64>,
    pub accounts: Vec<Address>,
    pub boxes: Vec<AppBoxReference>,
    pub sender: Address,
    pub params: SuggestedParams,
    /// Expected return type, for extraction from simulation logs.
    pub returns: Option<AbiType>,
}

struct GroupEntry {
    transaction: Transaction,
    returns: Option<AbiType>,
}

/// Result of simulating a composed group: the raw group outcome plus the
/// decoded ABI return value of each method call that declares one.
pub struct SimulateOutcome {
    pub group: SimulateGroupResult,
    pub returns: Vec<Option<AbiValue>>,
}

/// Builds a transaction group one call at a time, then signs and executes
/// it (or simulates it without signatures).
#[derive(Default)]
pub struct GroupComposer {
    entries: Vec<GroupEntry>,
}

impl GroupComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a bare transaction (e.g. a payment feeding a method call
    /// that does not consume it as an argument).
    pub fn add_transaction(&mut self, transaction: Transaction) {
        self.entries.push(GroupEntry {
            transaction,
            returns: None,
        });
    }

    /// Appends an ARC-4 method call. Transaction arguments are hoisted
    /// into the group ahead of the call, per the ABI convention.
    pub fn add_method_call(&mut self, call: MethodCallParams) -> Result<(), AlgodError> {
        let mut app_args = vec![ByteBuf::from(call.method.selector().to_vec())];
        for arg in call.args {
            match arg {
                MethodArg::Transaction(txn) => self.entries.push(GroupEntry {
                    transaction: txn,
                    returns: None,
                }),
                MethodArg::Value(value) => app_args.push(ByteBuf::from(value.encode()?)),
            }
        }

        let boxes = call
            .boxes
            .into_iter()
            .map(|reference| {
                let index = if reference.app_id == 0 || reference.app_id == call.app_id {
                    0
                } else {
                    let position = call
                        .foreign_apps
                        .iter()
                        .position(|app| *app == reference.app_id)
                        .ok_or_else(|| {
                            AlgodError::Encoding(format!(
                                "box reference to app {} missing from foreign apps",
                                reference.app_id
                            ))
                        })?;
                    position as u64 + 1
                };
                Ok(WireBoxReference {
                    index,
                    name: ByteBuf::from(reference.name),
                })
            })
            .collect::<Result<Vec<_>, AlgodError>>()?;

        self.entries.push(GroupEntry {
            transaction: Transaction {
                amount: 0,
                app_args,
                on_complete: ON_COMPLETE_NOOP,
                foreign_assets: call.foreign_assets,
                accounts: call.accounts,
                boxes,
                foreign_apps: call.foreign_apps,
                app_id: call.app_id,
                fee: call.params.fee,
                first_valid: call.params.first_valid,
                genesis_id: call.params.genesis_id.clone(),
                genesis_hash: ByteBuf::from(call.params.genesis_hash.to_vec()),
                group: ByteBuf::new(),
                last_valid: call.params.last_valid,
                receiver: Address::default(),
                sender: call.sender,
                txn_type: TransactionType::ApplicationCall,
            },
            returns: call.returns,
        });
        Ok(())
    }

    fn build(&mut self) -> Result<Vec<Transaction>, AlgodError> {
        let mut transactions: Vec<Transaction> = self
            .entries
            .iter()
            .map(|entry| entry.transaction.clone())
            .collect();
        if transactions.len() > 1 {
            assign_group_id(&mut transactions)?;
        }
        Ok(transactions)
    }

    /// Signs the group, submits it, and waits for confirmation.
    pub async fn execute(
        &mut self,
        algod: &AlgodClient,
        signer: &dyn TransactionSigner,
        wait_rounds: u64,
    ) -> Result<u64, AlgodError> {
        let transactions = self.build()?;
        let signed = transactions
            .into_iter()
            .map(|txn| signer.sign(&txn.sender.clone(), txn))
            .collect::<Result<Vec<_>, _>>()?;
        let txid = algod.submit_group(&signed).await?;
        let round = algod.wait_for_confirmation(&txid, wait_rounds).await?;
        debug!(%txid, round, "group confirmed");
        Ok(round)
    }

    /// Simulates the group with empty signatures and decodes any declared
    /// ABI return values from the `151f7c75`-prefixed log entries.
    pub async fn simulate(
        &mut self,
        algod: &AlgodClient,
        config: SimulateConfig,
    ) -> Result<SimulateOutcome, AlgodError> {
        let transactions = self.build()?;
        let unsigned: Vec<SignedTransaction> = transactions
            .into_iter()
            .map(SignedTransaction::unsigned)
            .collect();
        let group = algod.simulate(&unsigned, config).await?;

        let mut returns = Vec::with_capacity(self.entries.len());
        for (index, entry) in self.entries.iter().enumerate() {
            let Some(return_type) = &entry.returns else {
                returns.push(None);
                continue;
            };
            if !group.failure_message.is_empty() {
                returns.push(None);
                continue;
            }
            let logs = group.txn_logs.get(index).ok_or_else(|| {
                AlgodError::Abi(format!("no simulation result for transaction {index}"))
            })?;
            let return_log = logs
                .iter()
                .rev()
                .find(|log| log.starts_with(&RETURN_PREFIX))
                .ok_or_else(|| {
                    AlgodError::Abi(format!(
                        "method {} produced no return log",
                        entry.transaction.app_id
                    ))
                })?;
            returns.push(Some(abi::decode(
                return_type,
                &return_log[RETURN_PREFIX.len()..],
            )?));
        }

        Ok(SimulateOutcome { group, returns })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::transactions::MIN_TXN_FEE;

    fn params() -> SuggestedParams {
        SuggestedParams {
            fee: MIN_TXN_FEE,
            min_fee: MIN_TXN_FEE,
            first_valid: 50,
            last_valid: 150,
            genesis_id: "test".to_owned(),
            genesis_hash: [4u8; 32],
        }
    }

    fn call(boxes: Vec<AppBoxReference>, foreign_apps: Vec<u64>) -> MethodCallParams {
        MethodCallParams {
            app_id: 123,
            method: AbiMethod::new("gas()void"),
            args: Vec::new(),
            foreign_apps,
            foreign_assets: Vec::new(),
            accounts: Vec::new(),
            boxes,
            sender: Address([1u8; 32]),
            params: params(),
            returns: None,
        }
    }

    #[test]
    fn selector_is_first_app_arg() {
        let mut composer = GroupComposer::new();
        composer.add_method_call(call(Vec::new(), Vec::new())).unwrap();
        let transactions = composer.build().unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(
            transactions[0].app_args[0].as_slice(),
            AbiMethod::new("gas()void").selector()
        );
    }

    #[test]
    fn box_references_resolve_to_foreign_app_indices() {
        let mut composer = GroupComposer::new();
        composer
            .add_method_call(call(
                vec![
                    AppBoxReference::new(777, b"v".to_vec()),
                    AppBoxReference::new(123, b"stakers".to_vec()),
                    AppBoxReference::extra_io(),
                ],
                vec![777],
            ))
            .unwrap();
        let transactions = composer.build().unwrap();
        let boxes = &transactions[0].boxes;
        assert_eq!(boxes[0].index, 1);
        assert_eq!(boxes[1].index, 0);
        assert_eq!(boxes[2].index, 0);
    }

    #[test]
    fn unknown_box_app_is_rejected() {
        let mut composer = GroupComposer::new();
        let result =
            composer.add_method_call(call(vec![AppBoxReference::new(999, Vec::new())], vec![777]));
        assert_matches!(result, Err(AlgodError::Encoding(_)));
    }

    #[test]
    fn transaction_args_precede_the_call() {
        let payment =
            crate::transactions::make_payment(&params(), Address([1u8; 32]), Address([2u8; 32]), 7);
        let mut composer = GroupComposer::new();
        let mut method_call = call(Vec::new(), Vec::new());
        method_call.args = vec![
            MethodArg::Transaction(payment),
            MethodArg::Value(AbiValue::Uint(42)),
        ];
        composer.add_method_call(method_call).unwrap();
        let transactions = composer.build().unwrap();
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].txn_type, TransactionType::Payment);
        assert_eq!(transactions[1].txn_type, TransactionType::ApplicationCall);
        // Group id stamped on both members.
        assert_eq!(transactions[0].group, transactions[1].group);
        assert!(!transactions[0].group.is_empty());
        // Selector plus the encoded uint argument.
        assert_eq!(transactions[1].app_args.len(), 2);
    }
}
