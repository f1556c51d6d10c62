//! Warm storage service: verifier callbacks, lifecycle and owner surface

use alloy_primitives::{Address, Bytes, U256};
use tracing::{debug, info, warn};
use warm_storage_auth::{
    PayerAuthenticator, SessionKeyRegistry, add_pieces_message, create_data_set_message,
    create_data_set_with_cdn_message, schedule_removals_message,
};
use warm_storage_primitives::{
    CdnFlagMode, ClientIdScheme, ConfigError, DataSetId, Epoch, MetadataEntry, MetadataScope,
    PieceId, PricingConfig, ProviderChangePolicy, ProviderId, ProvingParams, RailId,
    ServiceConfig, TokenAmount,
    constants::{BYTES_PER_LEAF, MAX_COMMISSION_BPS, WITH_CDN_METADATA_KEY},
    metadata, minimum_storage_lockup, storage_rate_per_epoch,
};

use crate::{
    DataSet, NonceUsage, ProvingState, Result, ServiceError, ServiceEvent, ValidationOutcome,
    ledger::{LedgerError, PaymentsLedger, RailParams, RailView},
    proving::AdvanceKind,
    registry::ProviderRegistry,
    state::{ServiceState, StateSnapshot},
};

/// Caller and epoch of an incoming call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    /// Address invoking the operation
    pub caller: Address,
    /// Current block epoch
    pub epoch: Epoch,
}

impl CallContext {
    /// Create a call context
    pub const fn new(caller: Address, epoch: Epoch) -> Self {
        Self { caller, epoch }
    }
}

/// Payer payload delivered with the data set creation callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDataSetRequest {
    /// Paying client
    pub payer: Address,
    /// Client-chosen id, used under the nonce scheme
    pub client_data_set_id: U256,
    /// Metadata keys
    pub metadata_keys: Vec<String>,
    /// Metadata values, parallel to the keys
    pub metadata_values: Vec<String>,
    /// CDN opt-in under the field representation
    pub with_cdn: bool,
    /// Payer signature over the creation message
    pub signature: Bytes,
}

/// Payer payload delivered with the pieces-added callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddPiecesRequest {
    /// Write-once nonce
    pub nonce: U256,
    /// Metadata per added piece, in piece order
    pub piece_metadata: Vec<Vec<MetadataEntry>>,
    /// Payer signature over the add message
    pub signature: Bytes,
}

/// The warm storage coordination service
///
/// Every entry point validates fully before touching the ledger and commits
/// local state only after all ledger calls succeeded.
#[derive(Debug)]
pub struct WarmStorageService<P, R, K> {
    state: ServiceState,
    auth: PayerAuthenticator,
    payments: P,
    registry: R,
    session_keys: K,
    events: Vec<ServiceEvent>,
}

impl<P, R, K> WarmStorageService<P, R, K>
where
    P: PaymentsLedger,
    R: ProviderRegistry,
    K: SessionKeyRegistry,
{
    /// Create a service with empty state
    pub fn new(config: ServiceConfig, payments: P, registry: R, session_keys: K) -> Result<Self> {
        Self::with_state(ServiceState::new(config), payments, registry, session_keys)
    }

    /// Restore a service from a snapshot of any supported version
    pub fn from_snapshot(
        snapshot: StateSnapshot,
        payments: P,
        registry: R,
        session_keys: K,
    ) -> Result<Self> {
        let state = snapshot.into_current(&registry)?;
        Self::with_state(state, payments, registry, session_keys)
    }

    fn with_state(state: ServiceState, payments: P, registry: R, session_keys: K) -> Result<Self> {
        state.config.validate()?;
        let auth = PayerAuthenticator::new(&state.config.domain, state.config.service_address);
        Ok(Self { state, auth, payments, registry, session_keys, events: Vec::new() })
    }

    /// Snapshot of the current state
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::V2(self.state.clone())
    }

    /// Current state
    pub const fn state(&self) -> &ServiceState {
        &self.state
    }

    /// Active configuration
    pub const fn config(&self) -> &ServiceConfig {
        &self.state.config
    }

    /// Typed-data authenticator
    pub const fn authenticator(&self) -> &PayerAuthenticator {
        &self.auth
    }

    /// Payments ledger
    pub const fn payments(&self) -> &P {
        &self.payments
    }

    /// Mutable payments ledger
    pub const fn payments_mut(&mut self) -> &mut P {
        &mut self.payments
    }

    /// Provider registry
    pub const fn registry(&self) -> &R {
        &self.registry
    }

    /// Mutable provider registry
    pub const fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    /// Mutable session key registry
    pub const fn session_keys_mut(&mut self) -> &mut K {
        &mut self.session_keys
    }

    /// Events emitted since the last drain
    pub fn events(&self) -> &[ServiceEvent] {
        &self.events
    }

    /// Take all pending events
    pub fn drain_events(&mut self) -> Vec<ServiceEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: ServiceEvent) {
        self.events.push(event);
    }

    fn require_verifier(&self, ctx: CallContext) -> Result<()> {
        if ctx.caller != self.state.config.pdp_verifier {
            return Err(ServiceError::OnlyPdpVerifier(ctx.caller));
        }
        Ok(())
    }

    fn require_owner(&self, ctx: CallContext) -> Result<()> {
        if ctx.caller != self.state.config.owner {
            return Err(ServiceError::OnlyOwner(ctx.caller));
        }
        Ok(())
    }

    fn data_set(&self, data_set_id: DataSetId) -> Result<&DataSet> {
        self.state.data_sets.get(&data_set_id).ok_or(ServiceError::DataSetNotFound(data_set_id))
    }

    fn proving(&self, data_set_id: DataSetId) -> Result<&ProvingState> {
        self.state.proving.get(&data_set_id).ok_or(ServiceError::DataSetNotFound(data_set_id))
    }

    fn live_rail(&self, rail_id: RailId) -> Result<RailView> {
        let rail = self.payments.rail(rail_id).ok_or(LedgerError::UnknownRail(rail_id))?;
        if rail.is_terminated() {
            return Err(ServiceError::CdnRailTerminated(rail_id));
        }
        Ok(rail)
    }

    // --- verifier callbacks ---

    /// A data set was created in the proof verifier
    pub fn on_data_set_created(
        &mut self,
        ctx: CallContext,
        data_set_id: DataSetId,
        service_provider: Address,
        request: CreateDataSetRequest,
    ) -> Result<()> {
        self.require_verifier(ctx)?;
        let payer = request.payer;
        if payer.is_zero() {
            return Err(ServiceError::ZeroAddress("payer"));
        }
        if service_provider.is_zero() {
            return Err(ServiceError::ZeroAddress("service_provider"));
        }
        if self.state.data_sets.contains_key(&data_set_id) {
            return Err(ServiceError::DataSetAlreadyExists(data_set_id));
        }

        let provider_id = self
            .registry
            .provider_id(service_provider)
            .ok_or(ServiceError::ProviderNotRegistered(service_provider))?;
        if !self.registry.is_active(provider_id) {
            return Err(ServiceError::ProviderIdNotRegistered(provider_id));
        }
        if !self.state.is_provider_approved(provider_id) {
            return Err(ServiceError::ProviderNotApproved(provider_id));
        }
        let payee =
            self.registry.payee(provider_id).ok_or(ServiceError::ProviderIdNotRegistered(provider_id))?;

        let config = &self.state.config;
        let entries = MetadataEntry::zip(request.metadata_keys, request.metadata_values)?;
        config.metadata.validate(&entries, MetadataScope::DataSet)?;

        let client_data_set_id = match config.versioning.client_id_scheme {
            ClientIdScheme::PayerCounter => U256::from(self.state.next_client_data_set_id(payer)),
            ClientIdScheme::ClientNonce => request.client_data_set_id,
        };
        if self.state.nonces.client_data_set(payer, client_data_set_id).is_some() {
            return Err(ServiceError::ClientDataSetIdAlreadyUsed { payer, client_data_set_id });
        }

        let with_cdn = match config.versioning.cdn_flag {
            CdnFlagMode::MetadataKey => {
                let message = create_data_set_message(client_data_set_id, payee, &entries);
                self.auth.verify(&message, &request.signature, payer, &self.session_keys, ctx.epoch)?;
                metadata::has_key(&entries, WITH_CDN_METADATA_KEY)
            }
            CdnFlagMode::Field => {
                let message = create_data_set_with_cdn_message(
                    client_data_set_id,
                    request.with_cdn,
                    payee,
                    &entries,
                );
                self.auth.verify(&message, &request.signature, payer, &self.session_keys, ctx.epoch)?;
                request.with_cdn
            }
        };
        self.check_payer_funding(payer, with_cdn)?;

        let config = &self.state.config;
        let storage_rail = RailParams {
            token: config.token,
            from: payer,
            to: payee,
            operator: config.service_address,
            validator: config.service_address,
            commission_bps: config.commission_bps,
            service_fee_recipient: config.fee_recipient,
        };
        let pdp_rail_id = self.payments.create_rail(storage_rail.clone())?;
        self.payments.modify_rail_lockup(pdp_rail_id, config.lockup_period, U256::ZERO)?;

        let (cache_miss_rail_id, cdn_rail_id) = if with_cdn {
            let egress_rail = RailParams { commission_bps: 0, ..storage_rail };
            let cache_miss_rail_id = self.payments.create_rail(egress_rail.clone())?;
            self.payments.modify_rail_lockup(
                cache_miss_rail_id,
                0,
                config.pricing.cache_miss_lockup_amount,
            )?;
            let cdn_rail_id =
                self.payments.create_rail(RailParams { to: config.cdn_beneficiary, ..egress_rail })?;
            self.payments.modify_rail_lockup(cdn_rail_id, 0, config.pricing.cdn_lockup_amount)?;
            (Some(cache_miss_rail_id), Some(cdn_rail_id))
        } else {
            (None, None)
        };

        let data_set = DataSet {
            id: data_set_id,
            payer,
            service_provider,
            payee,
            provider_id,
            client_data_set_id,
            pdp_rail_id,
            cache_miss_rail_id,
            cdn_rail_id,
            commission_bps: config.commission_bps,
            pdp_end_epoch: 0,
            with_cdn,
            metadata: entries.clone(),
            piece_metadata: Default::default(),
            pieces_added: 0,
        };
        let proving = ProvingState::new(config.proving);

        for rail_id in data_set.rail_ids() {
            self.state.rail_to_data_set.insert(rail_id, data_set_id);
        }
        self.state.nonces.record_client_data_set(payer, client_data_set_id, data_set_id);
        if config.versioning.client_id_scheme == ClientIdScheme::PayerCounter {
            *self.state.payer_counters.entry(payer).or_default() += 1;
        }
        self.state.payer_data_sets.entry(payer).or_default().push(data_set_id);
        self.state.data_sets.insert(data_set_id, data_set);
        self.state.proving.insert(data_set_id, proving);

        info!(
            target: "warm_storage::lifecycle",
            data_set_id,
            %payer,
            %service_provider,
            provider_id,
            pdp_rail_id,
            with_cdn,
            "data set created"
        );
        self.emit(ServiceEvent::DataSetCreated {
            data_set_id,
            provider_id,
            pdp_rail_id,
            cache_miss_rail_id,
            cdn_rail_id,
            payer,
            service_provider,
            payee,
            metadata: entries,
        });
        Ok(())
    }

    /// Payer can fund the storage lockup and, with CDN, the fixed egress lockups
    fn check_payer_funding(&self, payer: Address, with_cdn: bool) -> Result<()> {
        let config = &self.state.config;
        let minimum_rate = storage_rate_per_epoch(0, &config.pricing)?;
        let mut required = minimum_storage_lockup(&config.pricing, config.lockup_period)?;
        if with_cdn {
            required = required
                .checked_add(config.pricing.cdn_lockup_amount)
                .and_then(|sum| sum.checked_add(config.pricing.cache_miss_lockup_amount))
                .ok_or(ServiceError::Overflow("required lockup"))?;
        }

        let operator = config.service_address;
        let approval = self.payments.operator_approval(config.token, payer, operator);
        if !approval.is_approved {
            return Err(ServiceError::OperatorNotApproved { payer, operator });
        }
        if approval.remaining_rate() < minimum_rate {
            return Err(ServiceError::InsufficientRateAllowance {
                required: minimum_rate,
                available: approval.remaining_rate(),
            });
        }
        if approval.remaining_lockup() < required {
            return Err(ServiceError::InsufficientLockupAllowance {
                required,
                available: approval.remaining_lockup(),
            });
        }
        if approval.max_lockup_period < config.lockup_period {
            return Err(ServiceError::InsufficientMaxLockupPeriod {
                required: config.lockup_period,
                available: approval.max_lockup_period,
            });
        }

        let account = self.payments.account(config.token, payer);
        if account.available() < required {
            return Err(ServiceError::InsufficientFunds { required, available: account.available() });
        }
        Ok(())
    }

    /// Pieces were added to a data set
    pub fn on_pieces_added(
        &mut self,
        ctx: CallContext,
        data_set_id: DataSetId,
        first_added: PieceId,
        pieces: &[Bytes],
        request: AddPiecesRequest,
    ) -> Result<()> {
        self.require_verifier(ctx)?;
        let data_set = self.data_set(data_set_id)?;
        if data_set.is_terminated() {
            return Err(ServiceError::PaymentAlreadyTerminated(data_set_id));
        }
        if request.piece_metadata.len() != pieces.len() {
            return Err(ServiceError::PieceMetadataLengthMismatch {
                pieces: pieces.len(),
                metadata: request.piece_metadata.len(),
            });
        }
        for entries in &request.piece_metadata {
            self.state.config.metadata.validate(entries, MetadataScope::Piece)?;
        }

        let payer = data_set.payer;
        if self.state.nonces.add_piece_nonce(payer, request.nonce).is_some() {
            return Err(ServiceError::NonceAlreadyUsed { payer, nonce: request.nonce });
        }
        let message = add_pieces_message(
            data_set.client_data_set_id,
            request.nonce,
            pieces,
            &request.piece_metadata,
        );
        self.auth.verify(&message, &request.signature, payer, &self.session_keys, ctx.epoch)?;

        let count = pieces.len() as u64;
        let piece_ids = (0..count)
            .map(|offset| first_added.checked_add(offset).ok_or(ServiceError::Overflow("piece id")))
            .collect::<Result<Vec<PieceId>>>()?;
        let data_set = self
            .state
            .data_sets
            .get_mut(&data_set_id)
            .ok_or(ServiceError::DataSetNotFound(data_set_id))?;
        for (piece_id, entries) in piece_ids.iter().zip(request.piece_metadata) {
            data_set.piece_metadata.insert(*piece_id, entries);
        }
        data_set.pieces_added += count;
        let usage = NonceUsage { data_set_id, piece_count: data_set.pieces_added };
        self.state.nonces.record_add_piece_nonce(payer, request.nonce, usage);

        debug!(target: "warm_storage::lifecycle", data_set_id, first_added, count, "pieces added");
        self.emit(ServiceEvent::PiecesAdded { data_set_id, piece_ids, nonce: request.nonce });
        Ok(())
    }

    /// Pieces were scheduled for removal
    pub fn on_pieces_scheduled_remove(
        &mut self,
        ctx: CallContext,
        data_set_id: DataSetId,
        piece_ids: &[PieceId],
        signature: &[u8],
    ) -> Result<()> {
        self.require_verifier(ctx)?;
        let data_set = self.data_set(data_set_id)?;
        if data_set.is_past_end(ctx.epoch) {
            return Err(ServiceError::PaymentBeyondEndEpoch {
                data_set_id,
                end_epoch: data_set.pdp_end_epoch,
                epoch: ctx.epoch,
            });
        }

        let message = schedule_removals_message(data_set.client_data_set_id, piece_ids);
        self.auth.verify(&message, signature, data_set.payer, &self.session_keys, ctx.epoch)?;

        debug!(target: "warm_storage::lifecycle", data_set_id, count = piece_ids.len(), "piece removals scheduled");
        self.emit(ServiceEvent::PieceRemovalsScheduled { data_set_id, piece_ids: piece_ids.to_vec() });
        Ok(())
    }

    /// A proof covering `challenge_count` challenges was accepted by the verifier
    pub fn on_possession_proven(
        &mut self,
        ctx: CallContext,
        data_set_id: DataSetId,
        challenge_count: u64,
    ) -> Result<()> {
        self.require_verifier(ctx)?;
        let data_set = self.data_set(data_set_id)?;
        if data_set.is_past_end(ctx.epoch) {
            return Err(ServiceError::PaymentBeyondEndEpoch {
                data_set_id,
                end_epoch: data_set.pdp_end_epoch,
                epoch: ctx.epoch,
            });
        }

        let period = self.proving(data_set_id)?.check_proof(data_set_id, ctx.epoch, challenge_count)?;
        self.state
            .proving
            .get_mut(&data_set_id)
            .ok_or(ServiceError::DataSetNotFound(data_set_id))?
            .record_proof(period);

        debug!(target: "warm_storage::proving", data_set_id, period, epoch = ctx.epoch, "possession proven");
        self.emit(ServiceEvent::PossessionProven { data_set_id, period, epoch: ctx.epoch });
        Ok(())
    }

    /// The verifier scheduled the next challenge, or none
    pub fn on_next_proving_period(
        &mut self,
        ctx: CallContext,
        data_set_id: DataSetId,
        challenge_epoch: Epoch,
        leaf_count: u64,
    ) -> Result<()> {
        self.require_verifier(ctx)?;
        let data_set = self.data_set(data_set_id)?;
        if data_set.is_past_end(ctx.epoch) {
            return Err(ServiceError::PaymentBeyondEndEpoch {
                data_set_id,
                end_epoch: data_set.pdp_end_epoch,
                epoch: ctx.epoch,
            });
        }
        let (pdp_rail_id, terminated) = (data_set.pdp_rail_id, data_set.is_terminated());

        let advance = self.proving(data_set_id)?.check_advance(data_set_id, ctx.epoch, challenge_epoch)?;

        let rate = if terminated {
            None
        } else {
            let total_bytes =
                leaf_count.checked_mul(BYTES_PER_LEAF).ok_or(ServiceError::Overflow("data set size"))?;
            let rate = storage_rate_per_epoch(total_bytes, &self.state.config.pricing)?;
            self.payments.modify_rail_payment(pdp_rail_id, rate, U256::ZERO)?;
            Some(rate)
        };

        self.state
            .proving
            .get_mut(&data_set_id)
            .ok_or(ServiceError::DataSetNotFound(data_set_id))?
            .apply_advance(&advance);

        if advance.faulted_periods > 0 {
            warn!(
                target: "warm_storage::proving",
                data_set_id,
                periods_faulted = advance.faulted_periods,
                deadline = advance.previous_deadline,
                epoch = ctx.epoch,
                "proving periods faulted"
            );
            self.emit(ServiceEvent::FaultRecord {
                data_set_id,
                periods_faulted: advance.faulted_periods,
                deadline: advance.previous_deadline,
            });
        }
        match advance.kind {
            AdvanceKind::Activated => {
                info!(target: "warm_storage::proving", data_set_id, activation_epoch = ctx.epoch, deadline = advance.next_deadline, "proving activated");
            }
            AdvanceKind::Closed => {
                debug!(target: "warm_storage::proving", data_set_id, "proving closed");
            }
            AdvanceKind::Reopened | AdvanceKind::Advanced => {
                debug!(target: "warm_storage::proving", data_set_id, deadline = advance.next_deadline, "proving period advanced");
            }
        }
        self.emit(ServiceEvent::NextProvingPeriod {
            data_set_id,
            challenge_epoch,
            deadline: advance.next_deadline,
            leaf_count,
        });
        if let Some(rate) = rate {
            self.emit(ServiceEvent::RailRateUpdated { data_set_id, rail_id: pdp_rail_id, rate });
        }
        Ok(())
    }

    /// The verifier deleted a data set
    pub fn on_data_set_deleted(
        &mut self,
        ctx: CallContext,
        data_set_id: DataSetId,
        deleted_leaf_count: u64,
    ) -> Result<()> {
        self.require_verifier(ctx)?;
        let data_set = self.data_set(data_set_id)?;
        if !data_set.is_past_end(ctx.epoch) {
            return Err(ServiceError::PaymentRailsNotFinalized {
                data_set_id,
                end_epoch: data_set.pdp_end_epoch,
                epoch: ctx.epoch,
            });
        }

        let data_set = self
            .state
            .data_sets
            .remove(&data_set_id)
            .ok_or(ServiceError::DataSetNotFound(data_set_id))?;
        self.state.proving.remove(&data_set_id);
        for rail_id in data_set.rail_ids() {
            self.state.rail_to_data_set.remove(&rail_id);
        }
        if let Some(ids) = self.state.payer_data_sets.get_mut(&data_set.payer) {
            ids.retain(|id| *id != data_set_id);
            if ids.is_empty() {
                self.state.payer_data_sets.remove(&data_set.payer);
            }
        }

        info!(target: "warm_storage::lifecycle", data_set_id, deleted_leaf_count, "data set deleted");
        self.emit(ServiceEvent::DataSetDeleted { data_set_id, deleted_leaf_count });
        Ok(())
    }

    /// The verifier moved a data set to another provider
    pub fn on_provider_changed(
        &mut self,
        ctx: CallContext,
        data_set_id: DataSetId,
        old_service_provider: Address,
        new_service_provider: Address,
    ) -> Result<()> {
        self.require_verifier(ctx)?;
        let data_set = self.data_set(data_set_id)?;
        match self.state.config.versioning.provider_change {
            ProviderChangePolicy::Disabled => {
                return Err(ServiceError::ProviderChangeDisabled(data_set_id));
            }
            ProviderChangePolicy::RegistryApproved => {}
        }
        if data_set.service_provider != old_service_provider {
            return Err(ServiceError::OldProviderMismatch {
                data_set_id,
                expected: data_set.service_provider,
                actual: old_service_provider,
            });
        }
        if new_service_provider.is_zero() {
            return Err(ServiceError::ZeroAddress("new_service_provider"));
        }
        let provider_id = self
            .registry
            .provider_id(new_service_provider)
            .ok_or(ServiceError::ProviderNotRegistered(new_service_provider))?;
        if !self.registry.is_active(provider_id) {
            return Err(ServiceError::ProviderIdNotRegistered(provider_id));
        }
        if !self.state.is_provider_approved(provider_id) {
            return Err(ServiceError::ProviderNotApproved(provider_id));
        }

        let data_set = self
            .state
            .data_sets
            .get_mut(&data_set_id)
            .ok_or(ServiceError::DataSetNotFound(data_set_id))?;
        data_set.service_provider = new_service_provider;
        data_set.provider_id = provider_id;

        info!(
            target: "warm_storage::lifecycle",
            data_set_id,
            old = %old_service_provider,
            new = %new_service_provider,
            provider_id,
            "provider changed"
        );
        self.emit(ServiceEvent::ProviderChanged {
            data_set_id,
            old_service_provider,
            new_service_provider,
            provider_id,
        });
        Ok(())
    }

    // --- ledger callbacks ---

    /// Ledger asks how much of a proposed settlement is owed
    pub fn arbitrate(
        &self,
        ctx: CallContext,
        rail_id: RailId,
        proposed: TokenAmount,
        from: Epoch,
        to: Epoch,
        rate: TokenAmount,
    ) -> Result<ValidationOutcome> {
        if ctx.caller != self.state.config.payments {
            return Err(ServiceError::OnlyPayments(ctx.caller));
        }
        self.state.arbitrate(rail_id, proposed, from, to, rate, ctx.epoch)
    }

    /// Ledger reports a rail was terminated
    ///
    /// Records the storage end epoch the first time; later reports and
    /// reports for egress rails leave the state unchanged.
    pub fn on_rail_terminated(
        &mut self,
        ctx: CallContext,
        rail_id: RailId,
        terminator: Address,
        end_epoch: Epoch,
    ) -> Result<()> {
        if ctx.caller != self.state.config.payments {
            return Err(ServiceError::OnlyPayments(ctx.caller));
        }
        let data_set_id =
            self.state.data_set_by_rail(rail_id).ok_or(ServiceError::RailNotAssociated(rail_id))?;
        let data_set = self
            .state
            .data_sets
            .get_mut(&data_set_id)
            .ok_or(ServiceError::DataSetNotFound(data_set_id))?;

        if rail_id != data_set.pdp_rail_id || data_set.is_terminated() {
            debug!(target: "warm_storage::lifecycle", data_set_id, rail_id, "ignoring rail termination");
            return Ok(());
        }
        data_set.pdp_end_epoch = end_epoch;

        info!(target: "warm_storage::lifecycle", data_set_id, rail_id, %terminator, end_epoch, "storage payment terminated");
        self.emit(ServiceEvent::PdpPaymentTerminated { data_set_id, end_epoch, pdp_rail_id: rail_id });
        Ok(())
    }

    // --- payer and provider operations ---

    /// Terminate storage and, when present, CDN payments of a data set
    pub fn terminate_service(&mut self, ctx: CallContext, data_set_id: DataSetId) -> Result<Epoch> {
        let data_set = self.data_set(data_set_id)?;
        if ctx.caller != data_set.payer
            && ctx.caller != data_set.payee
            && ctx.caller != data_set.service_provider
        {
            return Err(ServiceError::CallerNotPayerOrPayee { data_set_id, caller: ctx.caller });
        }
        if data_set.is_terminated() {
            return Err(ServiceError::PaymentAlreadyTerminated(data_set_id));
        }

        let pdp_rail_id = data_set.pdp_rail_id;
        let egress_rails: Vec<RailId> = [data_set.cache_miss_rail_id, data_set.cdn_rail_id]
            .into_iter()
            .flatten()
            .filter(|rail_id| self.payments.rail(*rail_id).is_some_and(|rail| !rail.is_terminated()))
            .collect();

        let end_epoch = self.payments.terminate_rail(pdp_rail_id, ctx.epoch)?;
        for rail_id in &egress_rails {
            self.payments.terminate_rail(*rail_id, ctx.epoch)?;
        }

        let data_set = self
            .state
            .data_sets
            .get_mut(&data_set_id)
            .ok_or(ServiceError::DataSetNotFound(data_set_id))?;
        data_set.pdp_end_epoch = end_epoch;
        let (cache_miss_rail_id, cdn_rail_id) = if data_set.has_cdn_rails() {
            data_set.strip_cdn_marker();
            (data_set.cache_miss_rail_id, data_set.cdn_rail_id)
        } else {
            (None, None)
        };

        info!(
            target: "warm_storage::lifecycle",
            data_set_id,
            caller = %ctx.caller,
            end_epoch,
            egress_rails = egress_rails.len(),
            "service terminated"
        );
        self.emit(ServiceEvent::ServiceTerminated {
            caller: ctx.caller,
            data_set_id,
            pdp_rail_id,
            cache_miss_rail_id,
            cdn_rail_id,
        });
        self.emit(ServiceEvent::PdpPaymentTerminated { data_set_id, end_epoch, pdp_rail_id });
        Ok(end_epoch)
    }

    /// Payer adds to the fixed lockups of the CDN rails
    pub fn top_up_cdn_payment_rails(
        &mut self,
        ctx: CallContext,
        data_set_id: DataSetId,
        cdn_amount: TokenAmount,
        cache_miss_amount: TokenAmount,
    ) -> Result<()> {
        let data_set = self.data_set(data_set_id)?;
        if ctx.caller != data_set.payer {
            return Err(ServiceError::OnlyPayer { caller: ctx.caller, payer: data_set.payer });
        }
        let (Some(cdn_rail_id), Some(cache_miss_rail_id)) =
            (data_set.cdn_rail_id, data_set.cache_miss_rail_id)
        else {
            return Err(ServiceError::NoCdnRails(data_set_id));
        };

        let cdn_rail = self.live_rail(cdn_rail_id)?;
        let cache_miss_rail = self.live_rail(cache_miss_rail_id)?;
        let cdn_lockup = cdn_rail
            .lockup_fixed
            .checked_add(cdn_amount)
            .ok_or(ServiceError::Overflow("cdn lockup"))?;
        let cache_miss_lockup = cache_miss_rail
            .lockup_fixed
            .checked_add(cache_miss_amount)
            .ok_or(ServiceError::Overflow("cache-miss lockup"))?;

        if !cdn_amount.is_zero() {
            self.payments.modify_rail_lockup(cdn_rail_id, cdn_rail.lockup_period, cdn_lockup)?;
        }
        if !cache_miss_amount.is_zero() {
            self.payments.modify_rail_lockup(
                cache_miss_rail_id,
                cache_miss_rail.lockup_period,
                cache_miss_lockup,
            )?;
        }

        info!(target: "warm_storage::lifecycle", data_set_id, %cdn_lockup, %cache_miss_lockup, "cdn rails topped up");
        self.emit(ServiceEvent::CdnPaymentRailsToppedUp { data_set_id, cdn_lockup, cache_miss_lockup });
        Ok(())
    }

    /// CDN controller charges egress usage from the fixed lockups
    pub fn settle_cdn_payment_rails(
        &mut self,
        ctx: CallContext,
        data_set_id: DataSetId,
        cdn_amount: TokenAmount,
        cache_miss_amount: TokenAmount,
    ) -> Result<()> {
        if ctx.caller != self.state.config.cdn_controller {
            return Err(ServiceError::OnlyCdnController(ctx.caller));
        }
        let data_set = self.data_set(data_set_id)?;
        let (Some(cdn_rail_id), Some(cache_miss_rail_id)) =
            (data_set.cdn_rail_id, data_set.cache_miss_rail_id)
        else {
            return Err(ServiceError::NoCdnRails(data_set_id));
        };

        let charges = [(cdn_rail_id, cdn_amount), (cache_miss_rail_id, cache_miss_amount)];
        let mut rails = Vec::with_capacity(charges.len());
        for (rail_id, amount) in charges {
            let rail = self.payments.rail(rail_id).ok_or(LedgerError::UnknownRail(rail_id))?;
            if amount > rail.lockup_fixed {
                return Err(ServiceError::InsufficientCdnLockup {
                    rail_id,
                    requested: amount,
                    available: rail.lockup_fixed,
                });
            }
            rails.push((rail_id, rail.payment_rate, amount));
        }
        for (rail_id, rate, amount) in rails {
            if !amount.is_zero() {
                self.payments.modify_rail_payment(rail_id, rate, amount)?;
            }
        }

        info!(target: "warm_storage::lifecycle", data_set_id, %cdn_amount, %cache_miss_amount, "cdn usage settled");
        self.emit(ServiceEvent::CdnPaymentSettled { data_set_id, cdn_amount, cache_miss_amount });
        Ok(())
    }

    // --- owner configuration ---

    /// Allow a registered provider to create data sets
    pub fn approve_provider(&mut self, ctx: CallContext, provider_id: ProviderId) -> Result<()> {
        self.require_owner(ctx)?;
        if !self.registry.is_active(provider_id) {
            return Err(ServiceError::ProviderIdNotRegistered(provider_id));
        }
        if !self.state.approved_providers.insert(provider_id) {
            return Err(ServiceError::ProviderAlreadyApproved(provider_id));
        }
        info!(target: "warm_storage::lifecycle", provider_id, "provider approved");
        self.emit(ServiceEvent::ProviderApproved(provider_id));
        Ok(())
    }

    /// Remove a provider from the approved list
    pub fn unapprove_provider(&mut self, ctx: CallContext, provider_id: ProviderId) -> Result<()> {
        self.require_owner(ctx)?;
        if !self.state.approved_providers.remove(&provider_id) {
            return Err(ServiceError::ProviderNotApproved(provider_id));
        }
        info!(target: "warm_storage::lifecycle", provider_id, "provider unapproved");
        self.emit(ServiceEvent::ProviderUnapproved(provider_id));
        Ok(())
    }

    /// Proving parameters for data sets created from now on
    pub fn set_proving_params(&mut self, ctx: CallContext, params: ProvingParams) -> Result<()> {
        self.require_owner(ctx)?;
        params.validate()?;
        self.state.config.proving = params;
        self.emit(ServiceEvent::ProvingParamsUpdated(params));
        Ok(())
    }

    /// Commission for data sets created from now on
    pub fn set_commission(&mut self, ctx: CallContext, commission_bps: u16) -> Result<()> {
        self.require_owner(ctx)?;
        if commission_bps > MAX_COMMISSION_BPS {
            return Err(ConfigError::CommissionTooHigh(commission_bps).into());
        }
        self.state.config.commission_bps = commission_bps;
        self.emit(ServiceEvent::CommissionUpdated(commission_bps));
        Ok(())
    }

    /// Replace the price sheet
    pub fn set_pricing(&mut self, ctx: CallContext, pricing: PricingConfig) -> Result<()> {
        self.require_owner(ctx)?;
        pricing.validate()?;
        self.state.config.pricing = pricing;
        self.emit(ServiceEvent::PricingUpdated);
        Ok(())
    }
}
