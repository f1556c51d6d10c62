//! EIP-712 payer messages

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_sol_types::{Eip712Domain, SolStruct, sol};
use std::borrow::Cow;
use tracing::trace;
use warm_storage_primitives::{DomainConfig, Epoch, PieceId};

use crate::{AuthError, SessionKeyRegistry, recover_signer};

sol! {
    /// Metadata key/value pair
    #[derive(Debug, PartialEq, Eq)]
    struct MetadataEntry {
        string key;
        string value;
    }

    /// Authorization to create a data set
    #[derive(Debug, PartialEq, Eq)]
    struct CreateDataSet {
        uint256 clientDataSetId;
        address payee;
        MetadataEntry[] metadata;
    }

    /// Authorization to create a data set with an explicit CDN opt-in
    #[derive(Debug, PartialEq, Eq)]
    struct CreateDataSetWithCdn {
        uint256 clientDataSetId;
        bool withCDN;
        address payee;
        MetadataEntry[] metadata;
    }

    /// Piece content identifier
    #[derive(Debug, PartialEq, Eq)]
    struct Cid {
        bytes data;
    }

    /// Metadata of the piece at `pieceIndex` within an add request
    #[derive(Debug, PartialEq, Eq)]
    struct PieceMetadata {
        uint256 pieceIndex;
        MetadataEntry[] metadata;
    }

    /// Authorization to add pieces to a data set
    #[derive(Debug, PartialEq, Eq)]
    struct AddPieces {
        uint256 clientDataSetId;
        uint256 nonce;
        Cid[] pieceData;
        PieceMetadata[] pieceMetadata;
    }

    /// Authorization to schedule piece removals
    #[derive(Debug, PartialEq, Eq)]
    struct SchedulePieceRemovals {
        uint256 clientDataSetId;
        uint256[] pieceIds;
    }
}

fn typed_entries(entries: &[warm_storage_primitives::MetadataEntry]) -> Vec<MetadataEntry> {
    entries
        .iter()
        .map(|entry| MetadataEntry { key: entry.key.clone(), value: entry.value.clone() })
        .collect()
}

/// Hash of the EIP-712 type string of `T`
///
/// Session keys are granted per message type using this hash.
pub fn type_hash<T: SolStruct>() -> B256 {
    keccak256(T::eip712_encode_type().as_bytes())
}

/// Build the [`CreateDataSet`] message
pub fn create_data_set_message(
    client_data_set_id: U256,
    payee: Address,
    metadata: &[warm_storage_primitives::MetadataEntry],
) -> CreateDataSet {
    CreateDataSet { clientDataSetId: client_data_set_id, payee, metadata: typed_entries(metadata) }
}

/// Build the [`CreateDataSetWithCdn`] message
pub fn create_data_set_with_cdn_message(
    client_data_set_id: U256,
    with_cdn: bool,
    payee: Address,
    metadata: &[warm_storage_primitives::MetadataEntry],
) -> CreateDataSetWithCdn {
    CreateDataSetWithCdn {
        clientDataSetId: client_data_set_id,
        withCDN: with_cdn,
        payee,
        metadata: typed_entries(metadata),
    }
}

/// Build the [`AddPieces`] message; piece metadata is indexed by position
pub fn add_pieces_message(
    client_data_set_id: U256,
    nonce: U256,
    pieces: &[Bytes],
    piece_metadata: &[Vec<warm_storage_primitives::MetadataEntry>],
) -> AddPieces {
    AddPieces {
        clientDataSetId: client_data_set_id,
        nonce,
        pieceData: pieces.iter().map(|data| Cid { data: data.clone() }).collect(),
        pieceMetadata: piece_metadata
            .iter()
            .enumerate()
            .map(|(index, entries)| PieceMetadata {
                pieceIndex: U256::from(index),
                metadata: typed_entries(entries),
            })
            .collect(),
    }
}

/// Build the [`SchedulePieceRemovals`] message
pub fn schedule_removals_message(
    client_data_set_id: U256,
    piece_ids: &[PieceId],
) -> SchedulePieceRemovals {
    SchedulePieceRemovals {
        clientDataSetId: client_data_set_id,
        pieceIds: piece_ids.iter().map(|id| U256::from(*id)).collect(),
    }
}

/// Verifies payer signatures under a fixed signing domain
#[derive(Debug, Clone)]
pub struct PayerAuthenticator {
    domain: Eip712Domain,
}

impl PayerAuthenticator {
    /// Domain from configuration with `verifying_contract` as the service address
    pub fn new(config: &DomainConfig, verifying_contract: Address) -> Self {
        let domain = Eip712Domain::new(
            Some(Cow::Owned(config.name.clone())),
            Some(Cow::Owned(config.version.clone())),
            Some(U256::from(config.chain_id)),
            Some(verifying_contract),
            None,
        );
        Self { domain }
    }

    /// Signing domain
    pub const fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    /// Digest a payer signs for `message`
    pub fn signing_hash<T: SolStruct>(&self, message: &T) -> B256 {
        message.eip712_signing_hash(&self.domain)
    }

    /// Check that `signature` over `message` was produced by `payer` or a live
    /// delegate of `payer` at `epoch`
    ///
    /// Returns the recovered signer.
    pub fn verify<T, S>(
        &self,
        message: &T,
        signature: &[u8],
        payer: Address,
        session_keys: &S,
        epoch: Epoch,
    ) -> Result<Address, AuthError>
    where
        T: SolStruct,
        S: SessionKeyRegistry + ?Sized,
    {
        let recovered = recover_signer(self.signing_hash(message), signature)?;
        if recovered == payer {
            return Ok(recovered);
        }

        let expiry = session_keys.authorization_expiry(payer, recovered, type_hash::<T>());
        if expiry == 0 {
            return Err(AuthError::InvalidSigner { payer, recovered });
        }
        if expiry < epoch {
            return Err(AuthError::SessionKeyExpired { payer, signer: recovered, expiry });
        }

        trace!(target: "warm_storage::auth", %payer, signer = %recovered, expiry, "accepted session key signature");
        Ok(recovered)
    }
}
