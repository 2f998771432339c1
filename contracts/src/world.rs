//! # World
//!
//! Every deployed contract, and the rules for calls that cross contract
//! boundaries:
//!
//! - **register** resolves each witness and folds the witnesses' roots for
//!   the subject into the credential's evidence root. A witness without a
//!   root cannot vouch for anything, so the call reverts.
//! - **addChild** requires the child to be a deployed contract.
//! - **verifyCredentialTree** walks witnesses across contracts, carrying the
//!   path of inner nodes it came through. A witness already on that path, or
//!   one reached when the path is `max_depth` long, reverts with "out of
//!   gas", the way a real contract stuck in a witness cycle would. The rule
//!   is the off-chain verifier's, so both modes agree on every tree.
//!
//! Execution is all-or-nothing: a call either returns its events and has
//! changed state, or returns a revert reason and has changed nothing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use credtree_protocol::crypto::aggregate;
use credtree_protocol::ledger::{ContractCall, ContractEvent, ContractQuery, Deployment, QueryOutput};
use credtree_protocol::primitives::{Address, Digest};
use credtree_protocol::tree::{Role, Stamp};

use crate::error::ContractError;
use crate::node::{ContractResult, NodeContract};

// ---------------------------------------------------------------------------
// Gas schedule
// ---------------------------------------------------------------------------

/// Flat per-call base cost.
pub const GAS_BASE: u64 = 21_000;
/// Cost of a call that reverts after the base is charged.
pub const GAS_REVERT: u64 = 5_000;

/// Gas charged for a successful call, before it runs.
pub fn gas_cost(call: &ContractCall) -> u64 {
    GAS_BASE
        + match call {
            ContractCall::Deploy(d) => 1_200_000 + 20_000 * d.owners.len() as u64,
            ContractCall::RegisterCredential { witnesses, .. } => {
                90_000 + 25_000 * witnesses.len() as u64
            }
            ContractCall::ApproveCredential { .. } => 30_000,
            ContractCall::AggregateCredentials { .. } => 60_000,
            ContractCall::RevokeCredential { .. } => 45_000,
            ContractCall::AddChild { .. } => 45_000,
            ContractCall::AddStudent { .. } => 50_000,
            ContractCall::RemoveStudent { .. } => 20_000,
        }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The result of a successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Set for deployments.
    pub contract_address: Option<Address>,
    /// Emitted events with their emitting contract.
    pub events: Vec<(Address, ContractEvent)>,
}

/// Serializable, so a run's final contract state can be saved and verified
/// again later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    contracts: HashMap<Address, NodeContract>,
    max_depth: usize,
}

impl World {
    /// `max_depth` bounds how many inner nodes a tree verification may nest.
    pub fn new(max_depth: usize) -> Self {
        Self {
            contracts: HashMap::new(),
            max_depth,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn contract(&self, address: &Address) -> Option<&NodeContract> {
        self.contracts.get(address)
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    fn target(&self, to: Option<Address>) -> ContractResult<&NodeContract> {
        let to = to.ok_or(ContractError::UnknownContract(Address::ZERO))?;
        self.contracts
            .get(&to)
            .ok_or(ContractError::UnknownContract(to))
    }

    fn target_mut(&mut self, to: Option<Address>) -> ContractResult<&mut NodeContract> {
        let to = to.ok_or(ContractError::UnknownContract(Address::ZERO))?;
        self.contracts
            .get_mut(&to)
            .ok_or(ContractError::UnknownContract(to))
    }

    /// Aggregate of each witness's recorded root for `subject`, in witness
    /// order. `None` when there are no witnesses.
    fn evidence_root(&self, subject: &Address, witnesses: &[Address]) -> ContractResult<Option<Digest>> {
        if witnesses.is_empty() {
            return Ok(None);
        }
        let mut roots = Vec::with_capacity(witnesses.len());
        for witness in witnesses {
            let child = self
                .contracts
                .get(witness)
                .ok_or(ContractError::UnknownContract(*witness))?;
            let root = child
                .root_for(subject)
                .ok_or(ContractError::NoAggregatedProof)?;
            roots.push(root.root);
        }
        let root = aggregate(&roots).map_err(|_| ContractError::NoAggregatedProof)?;
        Ok(Some(root))
    }

    fn deploy(&mut self, sender: Address, nonce: u64, deployment: &Deployment) -> ContractResult<Execution> {
        let address = Address::for_contract(&sender, nonce);
        let contract = NodeContract::deploy(address, deployment)?;
        let event = ContractEvent::NodeDeployed {
            created_by: sender,
            role: contract.role(),
        };
        self.contracts.insert(address, contract);
        tracing::debug!(contract = %address, kind = %deployment.kind, "node deployed");
        Ok(Execution {
            contract_address: Some(address),
            events: vec![(address, event)],
        })
    }

    /// Applies one call from `sender`. `nonce` is the sender's nonce for
    /// this call and determines deployment addresses.
    pub fn execute(
        &mut self,
        sender: Address,
        to: Option<Address>,
        nonce: u64,
        call: &ContractCall,
        stamp: Stamp,
    ) -> ContractResult<Execution> {
        let events = match call {
            ContractCall::Deploy(deployment) => return self.deploy(sender, nonce, deployment),
            ContractCall::RegisterCredential {
                subject,
                digest,
                witnesses,
            } => {
                self.target(to)?.check_register(&sender, subject, witnesses)?;
                let evidence_root = self.evidence_root(subject, witnesses)?;
                self.target_mut(to)?.register(
                    sender,
                    *subject,
                    *digest,
                    witnesses.clone(),
                    evidence_root,
                    stamp,
                )?
            }
            ContractCall::ApproveCredential { digest } => {
                self.target_mut(to)?.approve(sender, *digest)?
            }
            ContractCall::AggregateCredentials { subject } => {
                self.target_mut(to)?.aggregate(sender, *subject, stamp)?
            }
            ContractCall::RevokeCredential { digest, reason } => {
                self.target_mut(to)?.revoke(sender, *digest, *reason, stamp)?
            }
            ContractCall::AddChild { child } => {
                let child_role = self
                    .contracts
                    .get(child)
                    .map(NodeContract::role)
                    .ok_or(ContractError::UnknownContract(*child))?;
                self.target_mut(to)?.add_child(sender, *child, child_role)?
            }
            ContractCall::AddStudent { student } => {
                self.target_mut(to)?.add_student(sender, *student)?
            }
            ContractCall::RemoveStudent { student } => {
                self.target_mut(to)?.remove_student(sender, *student)?
            }
        };

        // Only reachable when the target resolved.
        let at = to.unwrap_or(Address::ZERO);
        Ok(Execution {
            contract_address: None,
            events: events.into_iter().map(|e| (at, e)).collect(),
        })
    }

    // -- Queries --------------------------------------------------------------

    pub fn query(&self, address: &Address, query: &ContractQuery) -> ContractResult<QueryOutput> {
        let node = self
            .contracts
            .get(address)
            .ok_or(ContractError::UnknownContract(*address))?;
        match query {
            ContractQuery::VerifyCredentialTree(subject) => {
                let mut path = vec![*address];
                self.verify_tree(node, subject, &mut path)?;
                Ok(QueryOutput::Bool(true))
            }
            other => node.query(other),
        }
    }

    fn verify_tree(
        &self,
        node: &NodeContract,
        subject: &Address,
        path: &mut Vec<Address>,
    ) -> ContractResult<()> {
        for digest in node.issued(subject)? {
            node.verify_credential(subject, digest)?;
            for witness in node.witnesses(digest) {
                if path.contains(&witness) || path.len() >= self.max_depth {
                    return Err(ContractError::OutOfGas);
                }
                let child = self
                    .contracts
                    .get(&witness)
                    .ok_or(ContractError::UnknownContract(witness))?;
                match child.role() {
                    Role::Leaf => {
                        child.verify_issued_credentials(subject)?;
                        let root = child
                            .root_for(subject)
                            .ok_or(ContractError::NoAggregatedProof)?;
                        child.verify_credential_root(subject, &root.root)?;
                    }
                    Role::Inner => {
                        path.push(witness);
                        let result = self.verify_tree(child, subject, path);
                        path.pop();
                        result?;
                    }
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use credtree_protocol::config::MAX_TREE_DEPTH;
    use credtree_protocol::tree::NodeKind;

    // -- Helpers --------------------------------------------------------------

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    fn stamp() -> Stamp {
        Stamp::new(1, Utc::now())
    }

    const ADMIN: u8 = 1;
    const S: u8 = 7;

    struct Fixture {
        world: World,
        nonce: u64,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                world: World::new(MAX_TREE_DEPTH),
                nonce: 0,
            }
        }

        fn call(&mut self, to: Option<Address>, call: ContractCall) -> ContractResult<Execution> {
            self.nonce += 1;
            self.world.execute(addr(ADMIN), to, self.nonce, &call, stamp())
        }

        fn deploy(&mut self, kind: NodeKind) -> Address {
            let exec = self
                .call(
                    None,
                    ContractCall::Deploy(Deployment {
                        kind,
                        owners: vec![addr(ADMIN)],
                        quorum: 1,
                    }),
                )
                .unwrap();
            exec.contract_address.unwrap()
        }

        /// Registers, approves and aggregates one credential for S.
        fn issue(&mut self, node: Address, digest: Digest, witnesses: Vec<Address>) {
            self.call(
                Some(node),
                ContractCall::RegisterCredential {
                    subject: addr(S),
                    digest,
                    witnesses,
                },
            )
            .unwrap();
            self.world
                .execute(addr(S), Some(node), 0, &ContractCall::ApproveCredential { digest }, stamp())
                .unwrap();
            self.call(Some(node), ContractCall::AggregateCredentials { subject: addr(S) })
                .unwrap();
        }

        fn verify_tree(&self, node: Address) -> ContractResult<QueryOutput> {
            self.world
                .query(&node, &ContractQuery::VerifyCredentialTree(addr(S)))
        }
    }

    // -- Tests ----------------------------------------------------------------

    #[test]
    fn deployment_addresses_are_deterministic() {
        let mut f = Fixture::new();
        let a = f.deploy(NodeKind::Course);
        assert_eq!(a, Address::for_contract(&addr(ADMIN), 1));
        assert_eq!(f.world.len(), 1);
    }

    #[test]
    fn witness_without_root_reverts() {
        let mut f = Fixture::new();
        let leaf = f.deploy(NodeKind::Node(Role::Leaf));
        let inner = f.deploy(NodeKind::Node(Role::Inner));
        f.call(Some(inner), ContractCall::AddChild { child: leaf }).unwrap();

        let err = f
            .call(
                Some(inner),
                ContractCall::RegisterCredential {
                    subject: addr(S),
                    digest: [1; 32],
                    witnesses: vec![leaf],
                },
            )
            .unwrap_err();
        assert_eq!(err, ContractError::NoAggregatedProof);
    }

    #[test]
    fn evidence_root_aggregates_witness_roots() {
        let mut f = Fixture::new();
        let leaf = f.deploy(NodeKind::Node(Role::Leaf));
        let inner = f.deploy(NodeKind::Node(Role::Inner));
        f.call(Some(inner), ContractCall::AddChild { child: leaf }).unwrap();
        f.issue(leaf, [1; 32], vec![]);
        f.issue(inner, [2; 32], vec![leaf]);

        let leaf_root = f.world.contract(&leaf).unwrap().root_for(&addr(S)).unwrap().root;
        let proof = f
            .world
            .contract(&inner)
            .unwrap()
            .notary()
            .store()
            .proof(&[2; 32])
            .cloned()
            .unwrap();
        assert_eq!(proof.evidence_root, Some(aggregate(&[leaf_root]).unwrap()));
        assert_eq!(f.verify_tree(inner).unwrap(), QueryOutput::Bool(true));
    }

    #[test]
    fn add_child_requires_a_contract() {
        let mut f = Fixture::new();
        let inner = f.deploy(NodeKind::Faculty);
        assert_eq!(
            f.call(Some(inner), ContractCall::AddChild { child: addr(0x99) })
                .unwrap_err(),
            ContractError::UnknownContract(addr(0x99))
        );
    }

    #[test]
    fn witness_cycle_runs_out_of_gas() {
        let mut f = Fixture::new();
        let a = f.deploy(NodeKind::Node(Role::Inner));
        let b = f.deploy(NodeKind::Node(Role::Inner));
        f.call(Some(a), ContractCall::AddChild { child: b }).unwrap();
        f.call(Some(b), ContractCall::AddChild { child: a }).unwrap();

        f.issue(b, [1; 32], vec![]);
        f.issue(a, [2; 32], vec![b]);
        f.issue(b, [3; 32], vec![a]);

        assert_eq!(f.verify_tree(a).unwrap_err(), ContractError::OutOfGas);
    }

    #[test]
    fn nesting_is_bounded_by_depth_not_width() {
        let mut f = Fixture::new();

        // One inner node over many leaves: wide, but one level deep.
        let wide = f.deploy(NodeKind::Node(Role::Inner));
        let mut leaves = Vec::new();
        for i in 0..(MAX_TREE_DEPTH * 5) {
            let leaf = f.deploy(NodeKind::Node(Role::Leaf));
            f.issue(leaf, [i as u8; 32], vec![]);
            f.call(Some(wide), ContractCall::AddChild { child: leaf }).unwrap();
            leaves.push(leaf);
        }
        f.issue(wide, [0xAA; 32], leaves);
        assert_eq!(f.verify_tree(wide).unwrap(), QueryOutput::Bool(true));

        // A chain of MAX_TREE_DEPTH inner nodes over one leaf.
        let mut below = f.deploy(NodeKind::Node(Role::Leaf));
        f.issue(below, [0xBB; 32], vec![]);
        let mut chain = Vec::new();
        for i in 0..MAX_TREE_DEPTH {
            let inner = f.deploy(NodeKind::Node(Role::Inner));
            f.call(Some(inner), ContractCall::AddChild { child: below }).unwrap();
            f.issue(inner, [0xC0 ^ i as u8; 32], vec![below]);
            chain.push(inner);
            below = inner;
        }
        assert_eq!(f.verify_tree(chain[MAX_TREE_DEPTH - 2]).unwrap(), QueryOutput::Bool(true));
        assert_eq!(
            f.verify_tree(chain[MAX_TREE_DEPTH - 1]).unwrap_err(),
            ContractError::OutOfGas
        );
    }

    #[test]
    fn failed_call_changes_nothing() {
        let mut f = Fixture::new();
        let course = f.deploy(NodeKind::Course);
        let err = f
            .world
            .execute(
                addr(0x42),
                Some(course),
                0,
                &ContractCall::AddStudent { student: addr(S) },
                stamp(),
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "Owners: sender is not an owner");
        assert_eq!(
            f.world.query(&course, &ContractQuery::Students).unwrap(),
            QueryOutput::Addresses(vec![])
        );
    }

    #[test]
    fn gas_grows_with_witnesses() {
        let one = ContractCall::RegisterCredential {
            subject: addr(S),
            digest: [0; 32],
            witnesses: vec![addr(1)],
        };
        let none = ContractCall::RegisterCredential {
            subject: addr(S),
            digest: [0; 32],
            witnesses: vec![],
        };
        assert!(gas_cost(&one) > gas_cost(&none));
    }
}
