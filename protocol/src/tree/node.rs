//! # Node Handles
//!
//! Client-side handles to node contracts, plus the capability traits they
//! expose:
//!
//! - [`OwnerQuery`]: who owns the node and what its quorum is.
//! - [`CredentialIssuer`]: register, approve, aggregate, revoke.
//! - [`TreeVerifier`]: the four verify operations, in either mode.
//!
//! Courses and faculties are nodes with a little extra surface (enrollment,
//! child registry). Rather than wrapping one in the other, every concrete
//! handle implements [`NodeBacked`] and picks up the three capabilities from
//! blanket impls. [`Entity`] is the tagged union you get back when you
//! resolve an address without knowing what lives there.
//!
//! Every handle carries a [`VerificationContext`]: the ledger it reads from
//! and the depth bound for tree walks. There is no global backend.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::config::MAX_TREE_DEPTH;
use crate::ledger::{ContractCall, ContractQuery, LedgerBackend, LedgerError, QueryOutput};
use crate::primitives::{Address, Digest};
use crate::transaction::{Confirmation, Transactor, TxContext, TxError};

use super::proof::{AggregatedProof, CredentialProof, NodeKind, RevocationProof, Role};
use super::verifier::{self, VerificationMode, VerifyError};

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Shared read context for node handles.
#[derive(Clone)]
pub struct VerificationContext {
    ledger: Arc<dyn LedgerBackend>,
    max_depth: usize,
}

impl VerificationContext {
    pub fn new(ledger: Arc<dyn LedgerBackend>) -> Self {
        Self {
            ledger,
            max_depth: MAX_TREE_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerBackend> {
        &self.ledger
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// A handle to the node at `address`. Does not check that it exists.
    pub fn node(&self, address: Address) -> NodeHandle {
        NodeHandle {
            address,
            ctx: self.clone(),
        }
    }

    /// Looks up what kind of contract lives at `address`.
    pub async fn resolve(&self, address: Address) -> Result<Entity, LedgerError> {
        let node = self.node(address);
        Ok(match node.kind().await? {
            NodeKind::Course => Entity::Course(CourseHandle { node }),
            NodeKind::Faculty => Entity::Faculty(FacultyHandle { node }),
            NodeKind::Node(_) => Entity::Node(node),
        })
    }
}

impl fmt::Debug for VerificationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationContext")
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// NodeHandle
// ---------------------------------------------------------------------------

/// A node contract, addressed through the ledger.
#[derive(Clone, Debug)]
pub struct NodeHandle {
    address: Address,
    ctx: VerificationContext,
}

impl NodeHandle {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn context(&self) -> &VerificationContext {
        &self.ctx
    }

    pub(crate) async fn query(&self, query: ContractQuery) -> Result<QueryOutput, LedgerError> {
        self.ctx.ledger.query(&self.address, query).await
    }

    pub async fn kind(&self) -> Result<NodeKind, LedgerError> {
        self.query(ContractQuery::Kind).await?.into_kind()
    }

    pub async fn role(&self) -> Result<Role, LedgerError> {
        Ok(self.kind().await?.role())
    }

    pub async fn owners(&self) -> Result<Vec<Address>, LedgerError> {
        self.query(ContractQuery::Owners).await?.into_addresses()
    }

    pub async fn quorum(&self) -> Result<usize, LedgerError> {
        self.query(ContractQuery::Quorum).await?.into_count()
    }

    pub async fn is_owner(&self, who: &Address) -> Result<bool, LedgerError> {
        self.query(ContractQuery::IsOwner(*who)).await?.into_bool()
    }

    pub async fn is_signed(&self, digest: &Digest, signer: &Address) -> Result<bool, LedgerError> {
        self.query(ContractQuery::IsSigned {
            digest: *digest,
            signer: *signer,
        })
        .await?
        .into_bool()
    }

    pub async fn is_quorum_signed(&self, digest: &Digest) -> Result<bool, LedgerError> {
        self.query(ContractQuery::IsQuorumSigned(*digest))
            .await?
            .into_bool()
    }

    /// Digests issued to `subject`, in issuance order.
    pub async fn digests(&self, subject: &Address) -> Result<Vec<Digest>, LedgerError> {
        self.query(ContractQuery::Digests(*subject))
            .await?
            .into_digests()
    }

    pub async fn proof(&self, digest: &Digest) -> Result<Option<CredentialProof>, LedgerError> {
        self.query(ContractQuery::Proof(*digest)).await?.into_proof()
    }

    pub async fn witnesses(&self, digest: &Digest) -> Result<Vec<Address>, LedgerError> {
        Ok(self
            .proof(digest)
            .await?
            .map(|p| p.witnesses)
            .unwrap_or_default())
    }

    pub async fn evidence_root(&self, digest: &Digest) -> Result<Option<Digest>, LedgerError> {
        Ok(self.proof(digest).await?.and_then(|p| p.evidence_root))
    }

    pub async fn revocation(&self, digest: &Digest) -> Result<Option<RevocationProof>, LedgerError> {
        self.query(ContractQuery::Revocation(*digest))
            .await?
            .into_revocation()
    }

    pub async fn is_revoked(&self, digest: &Digest) -> Result<bool, LedgerError> {
        self.query(ContractQuery::IsRevoked(*digest))
            .await?
            .into_bool()
    }

    /// The last aggregate recorded for `subject`.
    pub async fn root(&self, subject: &Address) -> Result<Option<AggregatedProof>, LedgerError> {
        self.query(ContractQuery::Root(*subject)).await?.into_root()
    }

    /// Registered child nodes.
    pub async fn children(&self) -> Result<Vec<Address>, LedgerError> {
        self.query(ContractQuery::Children).await?.into_addresses()
    }
}

// ---------------------------------------------------------------------------
// Course and Faculty
// ---------------------------------------------------------------------------

/// A course: a leaf node that only issues to enrolled students.
#[derive(Clone, Debug)]
pub struct CourseHandle {
    node: NodeHandle,
}

impl CourseHandle {
    pub fn new(node: NodeHandle) -> Self {
        Self { node }
    }

    pub async fn is_enrolled(&self, student: &Address) -> Result<bool, LedgerError> {
        self.node
            .query(ContractQuery::IsEnrolled(*student))
            .await?
            .into_bool()
    }

    pub async fn students(&self) -> Result<Vec<Address>, LedgerError> {
        self.node.query(ContractQuery::Students).await?.into_addresses()
    }

    pub async fn add_student(
        &self,
        tx: &Transactor,
        ctx: &TxContext,
        student: Address,
    ) -> Result<Confirmation, TxError> {
        tx.submit_and_wait(ctx, Some(self.node.address), ContractCall::AddStudent { student })
            .await
    }

    pub async fn remove_student(
        &self,
        tx: &Transactor,
        ctx: &TxContext,
        student: Address,
    ) -> Result<Confirmation, TxError> {
        tx.submit_and_wait(ctx, Some(self.node.address), ContractCall::RemoveStudent { student })
            .await
    }
}

/// A faculty: an inner node whose witnesses are its registered courses.
#[derive(Clone, Debug)]
pub struct FacultyHandle {
    node: NodeHandle,
}

impl FacultyHandle {
    pub fn new(node: NodeHandle) -> Self {
        Self { node }
    }

    pub async fn add_child(
        &self,
        tx: &Transactor,
        ctx: &TxContext,
        child: Address,
    ) -> Result<Confirmation, TxError> {
        tx.submit_and_wait(ctx, Some(self.node.address), ContractCall::AddChild { child })
            .await
    }
}

/// Whatever lives at an address, tagged by contract kind.
#[derive(Clone, Debug)]
pub enum Entity {
    Node(NodeHandle),
    Course(CourseHandle),
    Faculty(FacultyHandle),
}

impl Entity {
    pub fn as_course(&self) -> Option<&CourseHandle> {
        match self {
            Entity::Course(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_faculty(&self) -> Option<&FacultyHandle> {
        match self {
            Entity::Faculty(f) => Some(f),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Anything backed by a node contract.
pub trait NodeBacked: Send + Sync {
    fn node(&self) -> &NodeHandle;
}

impl NodeBacked for NodeHandle {
    fn node(&self) -> &NodeHandle {
        self
    }
}

impl NodeBacked for CourseHandle {
    fn node(&self) -> &NodeHandle {
        &self.node
    }
}

impl NodeBacked for FacultyHandle {
    fn node(&self) -> &NodeHandle {
        &self.node
    }
}

impl NodeBacked for Entity {
    fn node(&self) -> &NodeHandle {
        match self {
            Entity::Node(n) => n,
            Entity::Course(c) => &c.node,
            Entity::Faculty(f) => &f.node,
        }
    }
}

/// Ownership and quorum.
#[async_trait]
pub trait OwnerQuery {
    async fn owner_list(&self) -> Result<Vec<Address>, LedgerError>;
    async fn quorum_threshold(&self) -> Result<usize, LedgerError>;
    async fn has_owner(&self, who: &Address) -> Result<bool, LedgerError>;
}

#[async_trait]
impl<T: NodeBacked> OwnerQuery for T {
    async fn owner_list(&self) -> Result<Vec<Address>, LedgerError> {
        self.node().owners().await
    }

    async fn quorum_threshold(&self) -> Result<usize, LedgerError> {
        self.node().quorum().await
    }

    async fn has_owner(&self, who: &Address) -> Result<bool, LedgerError> {
        self.node().is_owner(who).await
    }
}

/// State-changing credential calls. Each consumes one transaction context.
#[async_trait]
pub trait CredentialIssuer {
    async fn register_credential(
        &self,
        tx: &Transactor,
        ctx: &TxContext,
        subject: Address,
        digest: Digest,
        witnesses: Vec<Address>,
    ) -> Result<Confirmation, TxError>;

    async fn approve_credential(
        &self,
        tx: &Transactor,
        ctx: &TxContext,
        digest: Digest,
    ) -> Result<Confirmation, TxError>;

    async fn aggregate_credentials(
        &self,
        tx: &Transactor,
        ctx: &TxContext,
        subject: Address,
    ) -> Result<Confirmation, TxError>;

    async fn revoke_credential(
        &self,
        tx: &Transactor,
        ctx: &TxContext,
        digest: Digest,
        reason: Digest,
    ) -> Result<Confirmation, TxError>;
}

#[async_trait]
impl<T: NodeBacked> CredentialIssuer for T {
    async fn register_credential(
        &self,
        tx: &Transactor,
        ctx: &TxContext,
        subject: Address,
        digest: Digest,
        witnesses: Vec<Address>,
    ) -> Result<Confirmation, TxError> {
        let call = ContractCall::RegisterCredential {
            subject,
            digest,
            witnesses,
        };
        tx.submit_and_wait(ctx, Some(self.node().address()), call).await
    }

    async fn approve_credential(
        &self,
        tx: &Transactor,
        ctx: &TxContext,
        digest: Digest,
    ) -> Result<Confirmation, TxError> {
        let call = ContractCall::ApproveCredential { digest };
        tx.submit_and_wait(ctx, Some(self.node().address()), call).await
    }

    async fn aggregate_credentials(
        &self,
        tx: &Transactor,
        ctx: &TxContext,
        subject: Address,
    ) -> Result<Confirmation, TxError> {
        let call = ContractCall::AggregateCredentials { subject };
        tx.submit_and_wait(ctx, Some(self.node().address()), call).await
    }

    async fn revoke_credential(
        &self,
        tx: &Transactor,
        ctx: &TxContext,
        digest: Digest,
        reason: Digest,
    ) -> Result<Confirmation, TxError> {
        let call = ContractCall::RevokeCredential { digest, reason };
        tx.submit_and_wait(ctx, Some(self.node().address()), call).await
    }
}

/// The verify operations, in either mode.
#[async_trait]
pub trait TreeVerifier {
    async fn verify_credential(
        &self,
        mode: VerificationMode,
        subject: Address,
        digest: Digest,
    ) -> Result<(), VerifyError>;

    async fn verify_issued_credentials(
        &self,
        mode: VerificationMode,
        subject: Address,
    ) -> Result<(), VerifyError>;

    async fn verify_credential_root(
        &self,
        mode: VerificationMode,
        subject: Address,
        root: Digest,
    ) -> Result<(), VerifyError>;

    async fn verify_credential_tree(
        &self,
        mode: VerificationMode,
        subject: Address,
    ) -> Result<(), VerifyError>;

    /// Issued credentials, then the stored root, then the whole tree.
    async fn verify_all(&self, mode: VerificationMode, subject: Address) -> Result<(), VerifyError>;
}

#[async_trait]
impl<T: NodeBacked> TreeVerifier for T {
    async fn verify_credential(
        &self,
        mode: VerificationMode,
        subject: Address,
        digest: Digest,
    ) -> Result<(), VerifyError> {
        let node = self.node();
        match mode {
            VerificationMode::OnChain => {
                verifier::on_chain(node, ContractQuery::VerifyCredential { subject, digest }).await
            }
            VerificationMode::OffChain => verifier::verify_credential(node, subject, digest).await,
        }
    }

    async fn verify_issued_credentials(
        &self,
        mode: VerificationMode,
        subject: Address,
    ) -> Result<(), VerifyError> {
        let node = self.node();
        match mode {
            VerificationMode::OnChain => {
                verifier::on_chain(node, ContractQuery::VerifyIssuedCredentials(subject)).await
            }
            VerificationMode::OffChain => verifier::verify_issued_credentials(node, subject).await,
        }
    }

    async fn verify_credential_root(
        &self,
        mode: VerificationMode,
        subject: Address,
        root: Digest,
    ) -> Result<(), VerifyError> {
        let node = self.node();
        match mode {
            VerificationMode::OnChain => {
                verifier::on_chain(node, ContractQuery::VerifyCredentialRoot { subject, root })
                    .await
            }
            VerificationMode::OffChain => {
                verifier::verify_credential_root(node, subject, root).await
            }
        }
    }

    async fn verify_credential_tree(
        &self,
        mode: VerificationMode,
        subject: Address,
    ) -> Result<(), VerifyError> {
        let node = self.node();
        match mode {
            VerificationMode::OnChain => {
                verifier::on_chain(node, ContractQuery::VerifyCredentialTree(subject)).await
            }
            VerificationMode::OffChain => verifier::verify_credential_tree(node, subject).await,
        }
    }

    async fn verify_all(&self, mode: VerificationMode, subject: Address) -> Result<(), VerifyError> {
        self.verify_issued_credentials(mode, subject).await?;
        if let Some(stored) = self.node().root(&subject).await? {
            self.verify_credential_root(mode, subject, stored.root).await?;
        }
        self.verify_credential_tree(mode, subject).await
    }
}
