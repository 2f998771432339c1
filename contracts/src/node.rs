//! # Node Contract
//!
//! The authoritative state machine behind every node address. One struct
//! serves all three kinds; what differs between a course, a faculty and a
//! generic node is which calls they accept:
//!
//! | Kind         | Role  | Witnesses on register   | Extra surface          |
//! |--------------|-------|-------------------------|------------------------|
//! | `Course`     | Leaf  | none                    | enrollment             |
//! | `Faculty`    | Inner | registered children     | child registry         |
//! | `Node(role)` | role  | children if inner       | child registry if inner|
//!
//! Calls that only need this contract's own state are answered here. Checks
//! that reach into other contracts (witness roots, tree verification) live
//! in [`World`](crate::world::World), which hands this contract the results.
//!
//! The three `verify_*` methods below run their checks in the same order as
//! the client-side off-chain verifier. If you reorder one, reorder both.

use serde::{Deserialize, Serialize};

use credtree_protocol::crypto::aggregate;
use credtree_protocol::ledger::{ContractEvent, ContractQuery, Deployment, QueryOutput};
use credtree_protocol::primitives::{Address, Digest};
use credtree_protocol::tree::{
    AggregatedProof, CredentialProof, NodeKind, Notary, OwnerSet, Registration, Role, Stamp,
};

use crate::error::ContractError;

pub type ContractResult<T> = Result<T, ContractError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeContract {
    address: Address,
    kind: NodeKind,
    notary: Notary,
    children: Vec<Address>,
    students: Vec<Address>,
}

impl NodeContract {
    pub fn deploy(address: Address, deployment: &Deployment) -> ContractResult<Self> {
        let owners = OwnerSet::new(deployment.owners.clone(), deployment.quorum)?;
        Ok(Self {
            address,
            kind: deployment.kind,
            notary: Notary::new(owners),
            children: Vec::new(),
            students: Vec::new(),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn role(&self) -> Role {
        self.kind.role()
    }

    pub fn notary(&self) -> &Notary {
        &self.notary
    }

    pub fn children(&self) -> &[Address] {
        &self.children
    }

    pub fn is_enrolled(&self, student: &Address) -> bool {
        self.students.contains(student)
    }

    pub fn root_for(&self, subject: &Address) -> Option<AggregatedProof> {
        self.notary.store().root_for(subject).copied()
    }

    pub fn witnesses(&self, digest: &Digest) -> Vec<Address> {
        self.notary
            .store()
            .proof(digest)
            .map(|p| p.witnesses.clone())
            .unwrap_or_default()
    }

    // -- Issuance -------------------------------------------------------------

    /// Everything about a registration this contract can check on its own.
    /// Runs before the world resolves witness roots.
    pub fn check_register(
        &self,
        sender: &Address,
        subject: &Address,
        witnesses: &[Address],
    ) -> ContractResult<()> {
        self.notary.owners().ensure_owner(sender)?;
        if self.kind == NodeKind::Course && !self.is_enrolled(subject) {
            return Err(ContractError::StudentNotRegistered);
        }
        match self.role() {
            Role::Leaf if !witnesses.is_empty() => return Err(ContractError::LeafWitnesses),
            Role::Leaf => {}
            Role::Inner => {
                for witness in witnesses {
                    if *witness == self.address {
                        return Err(ContractError::WitnessIsSelf);
                    }
                    if !self.children.contains(witness) {
                        return Err(ContractError::IssuerNotAdded);
                    }
                }
            }
        }
        Ok(())
    }

    /// Registers or co-signs. `evidence_root` is the aggregate of the
    /// witnesses' roots for `subject`, computed by the caller.
    pub fn register(
        &mut self,
        sender: Address,
        subject: Address,
        digest: Digest,
        witnesses: Vec<Address>,
        evidence_root: Option<Digest>,
        stamp: Stamp,
    ) -> ContractResult<Vec<ContractEvent>> {
        self.check_register(&sender, &subject, &witnesses)?;
        let event = match self
            .notary
            .register(sender, subject, digest, witnesses, evidence_root, stamp)?
        {
            Registration::Issued => ContractEvent::CredentialRegistered {
                digest,
                subject,
                registrar: sender,
            },
            Registration::Signed => ContractEvent::CredentialSigned {
                digest,
                signer: sender,
            },
        };
        Ok(vec![event])
    }

    pub fn approve(&mut self, sender: Address, digest: Digest) -> ContractResult<Vec<ContractEvent>> {
        self.notary.approve(sender, &digest)?;
        Ok(vec![ContractEvent::CredentialApproved {
            digest,
            subject: sender,
        }])
    }

    pub fn aggregate(
        &mut self,
        sender: Address,
        subject: Address,
        stamp: Stamp,
    ) -> ContractResult<Vec<ContractEvent>> {
        let proof = self.notary.aggregate(sender, subject, stamp)?;
        Ok(vec![ContractEvent::CredentialsAggregated {
            subject,
            aggregator: sender,
            root: proof.root,
        }])
    }

    pub fn revoke(
        &mut self,
        sender: Address,
        digest: Digest,
        reason: Digest,
        stamp: Stamp,
    ) -> ContractResult<Vec<ContractEvent>> {
        let record = self.notary.revoke(sender, &digest, reason, stamp)?;
        Ok(vec![ContractEvent::CredentialRevoked {
            digest,
            subject: record.subject,
            revoker: sender,
            reason,
        }])
    }

    // -- Child registry -------------------------------------------------------

    pub fn add_child(
        &mut self,
        sender: Address,
        child: Address,
        child_role: Role,
    ) -> ContractResult<Vec<ContractEvent>> {
        self.notary.owners().ensure_owner(&sender)?;
        if self.role() == Role::Leaf {
            return Err(ContractError::NotAccountable);
        }
        if child == self.address {
            return Err(ContractError::WitnessIsSelf);
        }
        if self.children.contains(&child) {
            return Err(ContractError::IssuerAlreadyAdded);
        }
        self.children.push(child);
        Ok(vec![ContractEvent::NodeAdded {
            created_by: sender,
            node: child,
            role: child_role,
        }])
    }

    // -- Enrollment -----------------------------------------------------------

    fn ensure_course(&self, method: &'static str) -> ContractResult<()> {
        if self.kind == NodeKind::Course {
            Ok(())
        } else {
            Err(ContractError::Unsupported(method))
        }
    }

    pub fn add_student(&mut self, sender: Address, student: Address) -> ContractResult<Vec<ContractEvent>> {
        self.ensure_course("addStudent")?;
        self.notary.owners().ensure_owner(&sender)?;
        if student.is_zero() {
            return Err(ContractError::ZeroAddress);
        }
        if self.notary.owners().is_owner(&student) {
            return Err(ContractError::StudentIsOwner);
        }
        if self.is_enrolled(&student) {
            return Err(ContractError::StudentAlreadyRegistered);
        }
        self.students.push(student);
        Ok(vec![ContractEvent::StudentAdded { student }])
    }

    pub fn remove_student(
        &mut self,
        sender: Address,
        student: Address,
    ) -> ContractResult<Vec<ContractEvent>> {
        self.ensure_course("removeStudent")?;
        self.notary.owners().ensure_owner(&sender)?;
        let Some(pos) = self.students.iter().position(|s| *s == student) else {
            return Err(ContractError::StudentNotRegistered);
        };
        self.students.remove(pos);
        Ok(vec![ContractEvent::StudentRemoved { student }])
    }

    // -- Verification ---------------------------------------------------------

    fn proof(&self, digest: &Digest) -> ContractResult<&CredentialProof> {
        self.notary
            .store()
            .proof(digest)
            .ok_or(ContractError::CredentialNotFound)
    }

    /// Not found, wrong subject, not approved, not quorum-signed, revoked.
    pub fn verify_credential(&self, subject: &Address, digest: &Digest) -> ContractResult<()> {
        let proof = self.proof(digest)?;
        if proof.subject != *subject {
            return Err(ContractError::WrongSubject);
        }
        if !proof.approved {
            return Err(ContractError::NotApproved);
        }
        if !self.notary.is_quorum_signed(digest) {
            return Err(ContractError::NotQuorumSigned);
        }
        if self.notary.store().is_revoked(digest) {
            return Err(ContractError::Revoked);
        }
        Ok(())
    }

    pub fn issued(&self, subject: &Address) -> ContractResult<&[Digest]> {
        let digests = self.notary.store().digests_for(subject);
        if digests.is_empty() {
            return Err(ContractError::NoCredentials);
        }
        Ok(digests)
    }

    pub fn verify_issued_credentials(&self, subject: &Address) -> ContractResult<()> {
        for digest in self.issued(subject)? {
            self.verify_credential(subject, digest)?;
        }
        Ok(())
    }

    pub fn verify_credential_root(&self, subject: &Address, expected: &Digest) -> ContractResult<()> {
        let digests = self.issued(subject)?;
        let stored = self.root_for(subject).ok_or(ContractError::NoAggregatedProof)?;
        if stored.root != *expected {
            return Err(ContractError::WrongRoot);
        }
        let computed = aggregate(digests).map_err(|_| ContractError::NoCredentials)?;
        if computed != *expected {
            return Err(ContractError::RootMismatch);
        }
        Ok(())
    }

    // -- Queries --------------------------------------------------------------

    /// Answers every query that does not need another contract.
    pub fn query(&self, query: &ContractQuery) -> ContractResult<QueryOutput> {
        let store = self.notary.store();
        Ok(match query {
            ContractQuery::Kind => QueryOutput::Kind(self.kind),
            ContractQuery::Owners => QueryOutput::Addresses(self.notary.owners().owners().to_vec()),
            ContractQuery::Quorum => QueryOutput::Count(self.notary.owners().quorum()),
            ContractQuery::IsOwner(who) => QueryOutput::Bool(self.notary.owners().is_owner(who)),
            ContractQuery::IsSigned { digest, signer } => {
                QueryOutput::Bool(self.notary.is_signed(digest, signer))
            }
            ContractQuery::IsQuorumSigned(digest) => {
                QueryOutput::Bool(self.notary.is_quorum_signed(digest))
            }
            ContractQuery::Digests(subject) => QueryOutput::Digests(store.digests_for(subject).to_vec()),
            ContractQuery::Proof(digest) => QueryOutput::Proof(store.proof(digest).cloned()),
            ContractQuery::Revocation(digest) => {
                QueryOutput::Revocation(store.revocation(digest).cloned())
            }
            ContractQuery::IsRevoked(digest) => QueryOutput::Bool(store.is_revoked(digest)),
            ContractQuery::Root(subject) => QueryOutput::Root(self.root_for(subject)),
            ContractQuery::Children => QueryOutput::Addresses(self.children.clone()),
            ContractQuery::IsEnrolled(student) => {
                self.ensure_course("isEnrolled")?;
                QueryOutput::Bool(self.is_enrolled(student))
            }
            ContractQuery::Students => {
                self.ensure_course("getStudents")?;
                QueryOutput::Addresses(self.students.clone())
            }
            ContractQuery::VerifyCredential { subject, digest } => {
                self.verify_credential(subject, digest)?;
                QueryOutput::Bool(true)
            }
            ContractQuery::VerifyIssuedCredentials(subject) => {
                self.verify_issued_credentials(subject)?;
                QueryOutput::Bool(true)
            }
            ContractQuery::VerifyCredentialRoot { subject, root } => {
                self.verify_credential_root(subject, root)?;
                QueryOutput::Bool(true)
            }
            ContractQuery::VerifyCredentialTree(_) => {
                return Err(ContractError::Unsupported("verifyCredentialTree"))
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
