//! Application services: infrastructure wiring plus the cross-aggregate rules
//! the domain cannot check on its own (uniqueness, reference guards, the
//! movement completion saga).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, info, warn};

use stockbook_auth::{RegisterUser, Role, User, UserCommand, UserId};
use stockbook_catalog::{
    ActivateProduct, Category, CategoryCommand, CategoryId, CreateCategory, CreatePackagingType,
    CreateProduct, DeactivateProduct, DeleteCategory, DeletePackagingType, DeleteProduct,
    PackagingType, PackagingTypeCommand, PackagingTypeId, Product, ProductCommand, ProductId,
    UpdateCategory, UpdatePackagingType, UpdateProduct, normalize_code,
};
use stockbook_core::{Aggregate, AggregateId, DomainError};
use stockbook_events::{Event, EventEnvelope, InMemoryEventBus};
use stockbook_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent},
    projections::{rebuild, Projections, ReplayError},
    streams,
    workers::{log_activity, BusWorker, WorkerHandle},
};
use stockbook_inventory::{
    AddItems, AdjustmentId, CancelMovement, CompleteMovement, CreateMovement, CreateWarehouse,
    DeleteMovement, DeleteWarehouse, LedgerCommand, MovementCommand, MovementId, MovementStatus,
    MovementType, NewItem, PostMovement, RemoveItem, ReverseMovement, SetStockLevel, StockLedger,
    StockLedgerId, StockMovement, UnitConversion, UpdateMovement, UpdateWarehouse, Warehouse,
    WarehouseCommand, WarehouseId, to_base_quantity,
};
use stockbook_invoicing::{
    build_invoice, Company, InvoiceDocument, InvoiceParty, InvoiceSource, InvoiceSourceLine,
};
use stockbook_parties::{DeleteParty, Party, PartyCommand, PartyId, PartyKind, RegisterParty, UpdateDetails};

#[cfg(feature = "postgres")]
use stockbook_infra::event_store::PostgresEventStore;

use crate::app::dto::{
    CategoryRequest, ItemRequest, MovementRequest, PackagingTypeRequest, PartyRequest, ProductRequest,
    UpdateMovementRequest, WarehouseRequest,
};
use crate::app::errors::ApiError;
use crate::config::AppConfig;

/// Attempts for a ledger append that loses an optimistic-concurrency race.
const LEDGER_ATTEMPTS: u32 = 3;

pub type ActivityBus = InMemoryEventBus<EventEnvelope<JsonValue>>;
pub type Dispatcher = CommandDispatcher<Arc<dyn EventStore>, Arc<ActivityBus>>;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("event store unavailable: {0}")]
    Store(#[from] EventStoreError),

    #[error("read model rebuild failed: {0}")]
    Replay(#[from] ReplayError),

    #[error("failed to start activity worker: {0}")]
    Worker(#[from] std::io::Error),

    #[error("seeding failed: {0}")]
    Seed(#[from] ApiError),
}

/// Shared state behind every handler.
///
/// Every write holds `writes` from its read-model checks through the append
/// to the read-model update, so uniqueness checks, generated references and
/// stream cursors see one write at a time.
pub struct AppServices {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) projections: Projections,
    pub(crate) company: Company,
    writes: Mutex<()>,
    _activity: WorkerHandle,
}

impl AppServices {
    /// Open the configured event store and rebuild read models from it.
    pub async fn build(config: &AppConfig) -> Result<Self, StartupError> {
        let store: Arc<dyn EventStore> = match &config.database_url {
            #[cfg(feature = "postgres")]
            Some(url) => Arc::new(PostgresEventStore::connect(url).await?),
            #[cfg(not(feature = "postgres"))]
            Some(_) => {
                warn!("DATABASE_URL is set but the postgres feature is disabled; using the in-memory store");
                Arc::new(InMemoryEventStore::new())
            }
            None => Arc::new(InMemoryEventStore::new()),
        };
        Self::with_store(store, config.company())
    }

    pub fn with_store(store: Arc<dyn EventStore>, company: Company) -> Result<Self, StartupError> {
        let bus = Arc::new(ActivityBus::new());
        let activity = BusWorker::spawn("activity-log", bus.as_ref(), log_activity)?;

        let projections = Projections::in_memory();
        rebuild(store.as_ref(), &projections)?;

        Ok(Self {
            dispatcher: CommandDispatcher::new(store, bus),
            projections,
            company,
            writes: Mutex::new(()),
            _activity: activity,
        })
    }

    pub fn projections(&self) -> &Projections {
        &self.projections
    }

    /// Whether nothing has ever been recorded.
    pub fn is_empty(&self) -> Result<bool, ApiError> {
        let events = self.dispatcher.store().load_all().map_err(DispatchError::from)?;
        Ok(events.is_empty())
    }

    // -------------------------
    // Dispatch plumbing
    // -------------------------

    fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Dispatch, then fold the committed events into the read models.
    fn execute<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &'static str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        let committed = self
            .dispatcher
            .dispatch(aggregate_id, aggregate_type, command, make_aggregate)?;
        if let Err(e) = self.projections.apply_committed(&committed) {
            warn!(aggregate_type, %aggregate_id, error = %e, "read model out of step; catching up from the stream");
            self.catch_up(aggregate_id, aggregate_type);
        }
        Ok(committed)
    }

    /// Re-feed a whole stream; cursors skip what the read models already hold.
    fn catch_up(&self, aggregate_id: AggregateId, aggregate_type: &'static str) {
        let result = self
            .dispatcher
            .store()
            .load_stream(aggregate_id)
            .map_err(|e| e.to_string())
            .and_then(|events| self.projections.apply_committed(&events).map_err(|e| e.to_string()));
        if let Err(e) = result {
            error!(aggregate_type, %aggregate_id, error = %e, "read model catch-up failed");
        }
    }

    fn category(&self, id: CategoryId, cmd: CategoryCommand) -> Result<(), ApiError> {
        self.execute(id.aggregate_id(), streams::CATEGORY, cmd, |a| Category::empty(CategoryId::new(a)))?;
        Ok(())
    }

    fn packaging_type(&self, id: PackagingTypeId, cmd: PackagingTypeCommand) -> Result<(), ApiError> {
        self.execute(id.aggregate_id(), streams::PACKAGING_TYPE, cmd, |a| {
            PackagingType::empty(PackagingTypeId::new(a))
        })?;
        Ok(())
    }

    fn product(&self, id: ProductId, cmd: ProductCommand) -> Result<(), ApiError> {
        self.execute(id.aggregate_id(), streams::PRODUCT, cmd, |a| Product::empty(ProductId::new(a)))?;
        Ok(())
    }

    fn warehouse(&self, id: WarehouseId, cmd: WarehouseCommand) -> Result<(), ApiError> {
        self.execute(id.aggregate_id(), streams::WAREHOUSE, cmd, |a| Warehouse::empty(WarehouseId::new(a)))?;
        Ok(())
    }

    fn party(&self, id: PartyId, cmd: PartyCommand) -> Result<(), ApiError> {
        self.execute(id.aggregate_id(), streams::PARTY, cmd, |a| Party::empty(PartyId::new(a)))?;
        Ok(())
    }

    fn movement(&self, id: MovementId, cmd: MovementCommand) -> Result<(), DispatchError> {
        self.execute(id.aggregate_id(), streams::MOVEMENT, cmd, |a| StockMovement::empty(MovementId::new(a)))?;
        Ok(())
    }

    /// Append to the single ledger stream, retrying lost concurrency races.
    fn ledger(&self, cmd: LedgerCommand) -> Result<(), DispatchError> {
        let id = StockLedgerId::main();
        let mut attempt = 1;
        loop {
            match self.execute(id.aggregate_id(), streams::STOCK_LEDGER, cmd.clone(), |a| {
                StockLedger::empty(StockLedgerId::new(a))
            }) {
                Err(e) if e.is_retryable() && attempt < LEDGER_ATTEMPTS => {
                    warn!(attempt, error = %e, "ledger append lost a race; retrying");
                    attempt += 1;
                }
                other => return other.map(|_| ()),
            }
        }
    }

    fn load_ledger(&self) -> Result<StockLedger, DispatchError> {
        self.dispatcher
            .load(StockLedgerId::main().aggregate_id(), |a| StockLedger::empty(StockLedgerId::new(a)))
    }

    // -------------------------
    // Categories
    // -------------------------

    pub fn create_category(&self, req: &CategoryRequest) -> Result<CategoryId, ApiError> {
        let _writes = self.write_guard();
        self.ensure_category_name_free(&req.name, None)?;
        let id = CategoryId::generate();
        self.category(
            id,
            CategoryCommand::Create(CreateCategory {
                category_id: id,
                name: req.name.clone(),
                description: req.description.clone(),
                occurred_at: Utc::now(),
            }),
        )?;
        info!(category_id = %id, "category created");
        Ok(id)
    }

    pub fn update_category(&self, id: CategoryId, req: &CategoryRequest) -> Result<(), ApiError> {
        let _writes = self.write_guard();
        self.projections.categories.get(&id).ok_or(ApiError::NotFound("category"))?;
        self.ensure_category_name_free(&req.name, Some(id))?;
        self.category(
            id,
            CategoryCommand::Update(UpdateCategory {
                category_id: id,
                name: req.name.clone(),
                description: req.description.clone(),
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn delete_category(&self, id: CategoryId) -> Result<(), ApiError> {
        let _writes = self.write_guard();
        self.projections.categories.get(&id).ok_or(ApiError::NotFound("category"))?;
        let used = self.projections.products.count_by_category().get(&id).copied().unwrap_or(0);
        if used > 0 {
            return Err(ApiError::InUse(format!("category is used by {used} product(s)")));
        }
        self.category(
            id,
            CategoryCommand::Delete(DeleteCategory {
                category_id: id,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(category_id = %id, "category deleted");
        Ok(())
    }

    fn ensure_category_name_free(&self, name: &str, except: Option<CategoryId>) -> Result<(), ApiError> {
        match self.projections.categories.find_by_name(name) {
            Some(existing) if Some(existing.category_id) != except => {
                Err(ApiError::field("name", "has already been taken"))
            }
            _ => Ok(()),
        }
    }

    // -------------------------
    // Packaging types
    // -------------------------

    pub fn create_packaging_type(&self, req: &PackagingTypeRequest) -> Result<PackagingTypeId, ApiError> {
        let _writes = self.write_guard();
        self.ensure_packaging_code_free(&req.code, None)?;
        let id = PackagingTypeId::generate();
        self.packaging_type(
            id,
            PackagingTypeCommand::Create(CreatePackagingType {
                packaging_type_id: id,
                name: req.name.clone(),
                code: req.code.clone(),
                active: req.active,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(packaging_type_id = %id, "packaging type created");
        Ok(id)
    }

    pub fn update_packaging_type(&self, id: PackagingTypeId, req: &PackagingTypeRequest) -> Result<(), ApiError> {
        let _writes = self.write_guard();
        self.projections
            .packaging_types
            .get(&id)
            .ok_or(ApiError::NotFound("packaging type"))?;
        self.ensure_packaging_code_free(&req.code, Some(id))?;
        self.packaging_type(
            id,
            PackagingTypeCommand::Update(UpdatePackagingType {
                packaging_type_id: id,
                name: req.name.clone(),
                code: req.code.clone(),
                active: req.active,
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn delete_packaging_type(&self, id: PackagingTypeId) -> Result<(), ApiError> {
        let _writes = self.write_guard();
        self.projections
            .packaging_types
            .get(&id)
            .ok_or(ApiError::NotFound("packaging type"))?;
        let used = self
            .projections
            .products
            .count_by_packaging_type()
            .get(&id)
            .copied()
            .unwrap_or(0);
        if used > 0 {
            return Err(ApiError::InUse(format!("packaging type is used by {used} product(s)")));
        }
        self.packaging_type(
            id,
            PackagingTypeCommand::Delete(DeletePackagingType {
                packaging_type_id: id,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(packaging_type_id = %id, "packaging type deleted");
        Ok(())
    }

    fn ensure_packaging_code_free(&self, raw_code: &str, except: Option<PackagingTypeId>) -> Result<(), ApiError> {
        let code = normalize_code(raw_code)?;
        match self.projections.packaging_types.find_by_code(&code) {
            Some(existing) if Some(existing.packaging_type_id) != except => {
                Err(ApiError::field("code", "has already been taken"))
            }
            _ => Ok(()),
        }
    }

    // -------------------------
    // Products
    // -------------------------

    pub fn create_product(&self, req: &ProductRequest) -> Result<ProductId, ApiError> {
        let _writes = self.write_guard();
        self.check_product_refs(req, None)?;
        let id = ProductId::generate();
        self.product(
            id,
            ProductCommand::CreateProduct(CreateProduct {
                product_id: id,
                details: req.details(),
                active: req.active,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(product_id = %id, reference = %req.reference.trim(), "product created");
        Ok(id)
    }

    pub fn update_product(&self, id: ProductId, req: &ProductRequest) -> Result<(), ApiError> {
        let _writes = self.write_guard();
        self.projections.products.get(&id).ok_or(ApiError::NotFound("product"))?;
        self.check_product_refs(req, Some(id))?;
        self.product(
            id,
            ProductCommand::UpdateProduct(UpdateProduct {
                product_id: id,
                details: req.details(),
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn set_product_active(&self, id: ProductId, active: bool) -> Result<(), ApiError> {
        let _writes = self.write_guard();
        let occurred_at = Utc::now();
        let cmd = if active {
            ProductCommand::ActivateProduct(ActivateProduct { product_id: id, occurred_at })
        } else {
            ProductCommand::DeactivateProduct(DeactivateProduct { product_id: id, occurred_at })
        };
        self.product(id, cmd)
    }

    pub fn delete_product(&self, id: ProductId) -> Result<(), ApiError> {
        let _writes = self.write_guard();
        self.projections.products.get(&id).ok_or(ApiError::NotFound("product"))?;
        if self.projections.movements.references_product(id) {
            return Err(ApiError::InUse("product appears on stock movements".to_string()));
        }
        if self.projections.stock.product_holds_stock(id) {
            return Err(ApiError::InUse("product still holds stock".to_string()));
        }
        self.product(
            id,
            ProductCommand::DeleteProduct(DeleteProduct {
                product_id: id,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(product_id = %id, "product deleted");
        Ok(())
    }

    fn check_product_refs(&self, req: &ProductRequest, except: Option<ProductId>) -> Result<(), ApiError> {
        if let Some(existing) = self.projections.products.find_by_reference(&req.reference) {
            if Some(existing.product_id) != except {
                return Err(ApiError::field("reference", "has already been taken"));
            }
        }
        if let Some(packaging_type_id) = req.packaging_type_id {
            if self.projections.packaging_types.get(&packaging_type_id).is_none() {
                return Err(ApiError::field("packaging_type_id", "is invalid"));
            }
        }
        if let Some(category_id) = req.category_id {
            if self.projections.categories.get(&category_id).is_none() {
                return Err(ApiError::field("category_id", "is invalid"));
            }
        }
        Ok(())
    }

    // -------------------------
    // Warehouses
    // -------------------------

    pub fn create_warehouse(&self, req: &WarehouseRequest) -> Result<WarehouseId, ApiError> {
        let _writes = self.write_guard();
        self.ensure_warehouse_code_free(&req.code, None)?;
        let id = WarehouseId::generate();
        self.warehouse(
            id,
            WarehouseCommand::Create(CreateWarehouse {
                warehouse_id: id,
                name: req.name.clone(),
                code: req.code.clone(),
                address: req.address.clone(),
                active: req.active,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(warehouse_id = %id, "warehouse created");
        Ok(id)
    }

    pub fn update_warehouse(&self, id: WarehouseId, req: &WarehouseRequest) -> Result<(), ApiError> {
        let _writes = self.write_guard();
        self.projections.warehouses.get(&id).ok_or(ApiError::NotFound("warehouse"))?;
        self.ensure_warehouse_code_free(&req.code, Some(id))?;
        self.warehouse(
            id,
            WarehouseCommand::Update(UpdateWarehouse {
                warehouse_id: id,
                name: req.name.clone(),
                code: req.code.clone(),
                address: req.address.clone(),
                active: req.active,
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn delete_warehouse(&self, id: WarehouseId) -> Result<(), ApiError> {
        let _writes = self.write_guard();
        self.projections.warehouses.get(&id).ok_or(ApiError::NotFound("warehouse"))?;
        if self.projections.movements.references_warehouse(id) {
            return Err(ApiError::InUse("warehouse appears on stock movements".to_string()));
        }
        if self
            .projections
            .stock
            .list()
            .iter()
            .any(|l| l.warehouse_id == id && l.quantity != 0)
        {
            return Err(ApiError::InUse("warehouse still holds stock".to_string()));
        }
        self.warehouse(
            id,
            WarehouseCommand::Delete(DeleteWarehouse {
                warehouse_id: id,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(warehouse_id = %id, "warehouse deleted");
        Ok(())
    }

    fn ensure_warehouse_code_free(&self, code: &str, except: Option<WarehouseId>) -> Result<(), ApiError> {
        match self.projections.warehouses.find_by_code(code) {
            Some(existing) if Some(existing.warehouse_id) != except => {
                Err(ApiError::field("code", "has already been taken"))
            }
            _ => Ok(()),
        }
    }

    // -------------------------
    // Customers & suppliers
    // -------------------------

    pub fn create_party(&self, kind: PartyKind, req: &PartyRequest) -> Result<PartyId, ApiError> {
        let _writes = self.write_guard();
        let id = PartyId::generate();
        self.party(
            id,
            PartyCommand::RegisterParty(RegisterParty {
                party_id: id,
                kind,
                name: req.name.clone(),
                contact: Some(req.contact()),
                tax_id: req.tax_id.clone(),
                occurred_at: Utc::now(),
            }),
        )?;
        info!(party_id = %id, kind = kind.as_str(), "party registered");
        Ok(id)
    }

    pub fn update_party(&self, kind: PartyKind, id: PartyId, req: &PartyRequest) -> Result<(), ApiError> {
        let _writes = self.write_guard();
        self.party_of_kind(kind, id)?;
        self.party(
            id,
            PartyCommand::UpdateDetails(UpdateDetails {
                party_id: id,
                name: Some(req.name.clone()),
                contact: Some(req.contact()),
                tax_id: req.tax_id.clone(),
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn delete_party(&self, kind: PartyKind, id: PartyId) -> Result<(), ApiError> {
        let _writes = self.write_guard();
        self.party_of_kind(kind, id)?;
        if self.projections.movements.references_party(id) {
            return Err(ApiError::InUse(format!("{} appears on stock movements", kind.as_str())));
        }
        self.party(
            id,
            PartyCommand::DeleteParty(DeleteParty {
                party_id: id,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(party_id = %id, kind = kind.as_str(), "party deleted");
        Ok(())
    }

    fn party_of_kind(&self, kind: PartyKind, id: PartyId) -> Result<(), ApiError> {
        match self.projections.parties.get(&id) {
            Some(p) if p.kind == kind => Ok(()),
            _ => Err(ApiError::NotFound(kind.as_str())),
        }
    }

    // -------------------------
    // Users
    // -------------------------

    pub fn register_user(&self, email: &str, display_name: &str, role: Role) -> Result<UserId, ApiError> {
        let _writes = self.write_guard();
        if self.projections.users.find_by_email(email).is_some() {
            return Err(ApiError::field("email", "has already been taken"));
        }
        let id = UserId::generate();
        self.execute(
            id.aggregate_id(),
            streams::USER,
            UserCommand::Register(RegisterUser {
                user_id: id,
                email: email.to_string(),
                display_name: display_name.to_string(),
                role,
                occurred_at: Utc::now(),
            }),
            |a| User::empty(UserId::new(a)),
        )?;
        info!(user_id = %id, "user registered");
        Ok(id)
    }

    // -------------------------
    // Stock movements
    // -------------------------

    pub fn create_movement(
        &self,
        created_by: UserId,
        movement_type: MovementType,
        req: &MovementRequest,
    ) -> Result<MovementId, ApiError> {
        let _writes = self.write_guard();
        let reference = match req.reference.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            Some(r) => {
                if self.projections.movements.find_by_reference(r).is_some() {
                    return Err(ApiError::field("reference", "has already been taken"));
                }
                r.to_string()
            }
            None => self
                .projections
                .movements
                .next_reference(movement_type, Utc::now().date_naive())
                .ok_or_else(|| ApiError::field("reference", "cannot be generated for today; enter one"))?,
        };
        self.check_warehouse("from_warehouse_id", req.from_warehouse_id)?;
        self.check_warehouse("to_warehouse_id", req.to_warehouse_id)?;
        self.check_party("supplier_id", req.supplier_id, PartyKind::Supplier)?;
        self.check_party("customer_id", req.customer_id, PartyKind::Customer)?;
        let items = self.resolve_items(&req.items)?;

        let id = MovementId::generate();
        let now = Utc::now();
        self.movement(
            id,
            MovementCommand::Create(CreateMovement {
                movement_id: id,
                reference: reference.clone(),
                movement_type,
                from_warehouse: req.from_warehouse_id,
                to_warehouse: req.to_warehouse_id,
                supplier_id: req.supplier_id,
                customer_id: req.customer_id,
                created_by,
                notes: req.notes.clone(),
                moved_at: req.moved_at,
                occurred_at: now,
            }),
        )?;
        if !items.is_empty() {
            self.movement(
                id,
                MovementCommand::AddItems(AddItems {
                    movement_id: id,
                    items,
                    occurred_at: now,
                }),
            )?;
        }
        info!(movement_id = %id, %reference, movement_type = movement_type.as_str(), "movement created");
        Ok(id)
    }

    pub fn update_movement(&self, id: MovementId, req: &UpdateMovementRequest) -> Result<(), ApiError> {
        let _writes = self.write_guard();
        self.movement(
            id,
            MovementCommand::Update(UpdateMovement {
                movement_id: id,
                notes: req.notes.clone(),
                moved_at: req.moved_at,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    pub fn add_items(&self, id: MovementId, items: &[ItemRequest]) -> Result<(), ApiError> {
        let _writes = self.write_guard();
        self.projections.movements.get(&id).ok_or(ApiError::NotFound("movement"))?;
        let items = self.resolve_items(items)?;
        self.movement(
            id,
            MovementCommand::AddItems(AddItems {
                movement_id: id,
                items,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    pub fn remove_item(&self, id: MovementId, line_no: u32) -> Result<(), ApiError> {
        let _writes = self.write_guard();
        self.movement(
            id,
            MovementCommand::RemoveItem(RemoveItem {
                movement_id: id,
                line_no,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    pub fn cancel_movement(&self, id: MovementId, reason: Option<String>) -> Result<(), ApiError> {
        let _writes = self.write_guard();
        self.movement(
            id,
            MovementCommand::Cancel(CancelMovement {
                movement_id: id,
                reason,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(movement_id = %id, "movement cancelled");
        Ok(())
    }

    pub fn delete_movement(&self, id: MovementId) -> Result<(), ApiError> {
        let _writes = self.write_guard();
        self.movement(
            id,
            MovementCommand::Delete(DeleteMovement {
                movement_id: id,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(movement_id = %id, "movement deleted");
        Ok(())
    }

    /// Complete a draft: post its stock effects, then mark it completed.
    ///
    /// A posting whose completion fails is reversed before the error is
    /// returned, so the ledger never keeps deltas of an uncompleted movement.
    pub fn complete_movement(&self, id: MovementId) -> Result<(), ApiError> {
        let _writes = self.write_guard();
        let movement = self
            .dispatcher
            .load(id.aggregate_id(), |a| StockMovement::empty(MovementId::new(a)))?;
        if !movement.is_created() {
            return Err(ApiError::NotFound("movement"));
        }

        let complete = || {
            MovementCommand::Complete(CompleteMovement {
                movement_id: id,
                occurred_at: Utc::now(),
            })
        };
        if movement.status() != MovementStatus::Draft || movement.items().is_empty() {
            // The aggregate reports why it refuses.
            self.movement(id, complete())?;
            return Ok(());
        }

        for item in movement.items() {
            if self.projections.products.get(&item.product_id).is_none() {
                return Err(ApiError::field(
                    format!("items.{}.product_id", item.line_no),
                    "references an unknown product",
                ));
            }
        }

        if self.load_ledger()?.is_posted(id) {
            warn!(movement_id = %id, "posting already recorded; resuming completion");
        } else {
            self.ledger(LedgerCommand::PostMovement(PostMovement {
                movement_id: id,
                reference: movement.reference().to_string(),
                lines: movement.posting_lines()?,
                occurred_at: Utc::now(),
            }))?;
            info!(movement_id = %id, reference = movement.reference(), "stock posted");
        }

        if let Err(err) = self.movement(id, complete()) {
            let current = self
                .dispatcher
                .load(id.aggregate_id(), |a| StockMovement::empty(MovementId::new(a)))?;
            if current.status() == MovementStatus::Completed {
                info!(movement_id = %id, "movement completed by another writer; keeping the posting");
                return Ok(());
            }
            warn!(movement_id = %id, error = %err, "completion failed after posting; reversing");
            let reversal = self.ledger(LedgerCommand::ReverseMovement(ReverseMovement {
                movement_id: id,
                occurred_at: Utc::now(),
            }));
            if let Err(rev) = reversal {
                error!(movement_id = %id, error = %rev, "reversal failed; ledger keeps the posting");
            }
            return Err(err.into());
        }

        info!(
            movement_id = %id,
            reference = movement.reference(),
            movement_type = movement.movement_type().as_str(),
            "movement completed"
        );
        Ok(())
    }

    fn check_warehouse(&self, field: &'static str, id: Option<WarehouseId>) -> Result<(), ApiError> {
        match id {
            Some(id) if self.projections.warehouses.get(&id).is_none() => Err(ApiError::field(field, "is invalid")),
            _ => Ok(()),
        }
    }

    fn check_party(&self, field: &'static str, id: Option<PartyId>, kind: PartyKind) -> Result<(), ApiError> {
        let Some(id) = id else {
            return Ok(());
        };
        match self.projections.parties.get(&id) {
            Some(p) if p.kind == kind => Ok(()),
            _ => Err(ApiError::field(field, "is invalid")),
        }
    }

    /// Resolve form lines into base-unit items, reporting errors per line.
    fn resolve_items(&self, items: &[ItemRequest]) -> Result<Vec<NewItem>, ApiError> {
        items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                let prefix = format!("items.{idx}");
                let product = self
                    .projections
                    .products
                    .get(&item.product_id)
                    .ok_or_else(|| ApiError::field(format!("{prefix}.product_id"), "is invalid"))?;
                let packaging_code = product
                    .packaging_type_id
                    .and_then(|id| self.projections.packaging_types.get(&id))
                    .map(|p| p.code)
                    .unwrap_or_default();
                let conversion = UnitConversion {
                    packaging_code: &packaging_code,
                    units_per_package: product.units_per_package,
                };
                let quantity_in_base_unit = to_base_quantity(item.quantity, &item.unit, &conversion)
                    .map_err(|e| ApiError::from(e).nest_field(&prefix))?;

                Ok(NewItem {
                    product_id: item.product_id,
                    quantity_in_base_unit,
                    entered_quantity: item.quantity,
                    entered_unit: item.unit.trim().to_string(),
                    unit_price: item.unit_price,
                })
            })
            .collect()
    }

    // -------------------------
    // Stock levels
    // -------------------------

    /// Record a counted level; the ledger books the difference.
    pub fn set_stock_level(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        counted: i64,
        reason: Option<String>,
    ) -> Result<(), ApiError> {
        let _writes = self.write_guard();
        if self.projections.products.get(&product_id).is_none() {
            return Err(ApiError::field("product_id", "is invalid"));
        }
        if self.projections.warehouses.get(&warehouse_id).is_none() {
            return Err(ApiError::field("warehouse_id", "is invalid"));
        }
        self.ledger(LedgerCommand::SetStockLevel(SetStockLevel {
            adjustment_id: AdjustmentId::generate(),
            product_id,
            warehouse_id,
            counted,
            reason,
            occurred_at: Utc::now(),
        }))?;
        info!(%product_id, %warehouse_id, counted, "stock level set");
        Ok(())
    }

    // -------------------------
    // Invoices
    // -------------------------

    pub fn invoice(&self, id: MovementId) -> Result<InvoiceDocument, ApiError> {
        let movement = self.projections.movements.get(&id).ok_or(ApiError::NotFound("movement"))?;
        let warehouse_name = |id: Option<WarehouseId>| {
            id.and_then(|id| self.projections.warehouses.get(&id)).map(|w| w.name)
        };

        let lines = movement
            .items
            .iter()
            .map(|item| {
                let product = self.projections.products.get(&item.product_id);
                InvoiceSourceLine {
                    line_no: item.line_no,
                    product_reference: product.as_ref().map(|p| p.reference.clone()).unwrap_or_default(),
                    product_name: product
                        .as_ref()
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| item.product_id.to_string()),
                    quantity_in_base_unit: item.quantity_in_base_unit,
                    entered_quantity: item.entered_quantity,
                    entered_unit: item.entered_unit.clone(),
                    item_price: item.unit_price,
                    purchase_price: product.map(|p| p.purchase_price).unwrap_or(0),
                }
            })
            .collect();

        let party = movement
            .party_id()
            .and_then(|pid| self.projections.parties.get(&pid))
            .map(|p| InvoiceParty {
                name: p.name,
                address: p.address,
                email: p.email,
                phone: p.phone,
                tax_id: p.tax_id,
            });

        let source = InvoiceSource {
            reference: movement.reference.clone(),
            movement_type: movement.movement_type,
            status: movement.status,
            moved_at: movement.moved_at,
            from_warehouse: warehouse_name(movement.from_warehouse_id),
            to_warehouse: warehouse_name(movement.to_warehouse_id),
            party,
            notes: movement.notes.clone(),
            lines,
        };
        Ok(build_invoice(&source, &self.company)?)
    }
}

impl core::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppServices")
            .field("projections", &self.projections)
            .field("company", &self.company)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use rust_decimal::Decimal;

    use super::*;

    fn company() -> Company {
        Company {
            name: "Test".to_string(),
            address: None,
            currency: "MAD".to_string(),
        }
    }

    fn services() -> (Arc<dyn EventStore>, AppServices) {
        let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
        let services = AppServices::with_store(store.clone(), company()).unwrap();
        (store, services)
    }

    /// A product, a warehouse and a supplier under codes ending in `tag`.
    fn depot(services: &AppServices, tag: usize) -> (ProductId, WarehouseId, PartyId) {
        let packaging = services
            .create_packaging_type(&PackagingTypeRequest {
                name: format!("Carton {tag}"),
                code: format!("CTN{tag}"),
                active: true,
            })
            .unwrap();
        let product = services
            .create_product(&ProductRequest {
                reference: format!("SKU-{tag}"),
                name: format!("Product {tag}"),
                description: None,
                category_id: None,
                packaging_type_id: Some(packaging),
                purchase_price: 100,
                low_stock_threshold: Decimal::ZERO,
                units_per_package: Some(Decimal::from(12)),
                image_url: None,
                active: true,
            })
            .unwrap();
        let warehouse = services
            .create_warehouse(&WarehouseRequest {
                name: format!("Depot {tag}"),
                code: format!("WH{tag}"),
                address: None,
                active: true,
            })
            .unwrap();
        let supplier = services
            .create_party(
                PartyKind::Supplier,
                &PartyRequest {
                    name: format!("Supplier {tag}"),
                    email: None,
                    phone: None,
                    address: None,
                    tax_id: None,
                },
            )
            .unwrap();
        (product, warehouse, supplier)
    }

    fn incoming(product: ProductId, warehouse: WarehouseId, supplier: PartyId, reference: Option<String>) -> MovementRequest {
        MovementRequest {
            movement_type: None,
            reference,
            from_warehouse_id: None,
            to_warehouse_id: Some(warehouse),
            supplier_id: Some(supplier),
            customer_id: None,
            notes: None,
            moved_at: None,
            items: vec![ItemRequest {
                product_id: product,
                quantity: Decimal::from(5),
                unit: "unit".to_string(),
                unit_price: None,
            }],
        }
    }

    #[test]
    fn racing_completions_post_exactly_once() {
        let (store, services) = services();
        let (product, warehouse, supplier) = depot(&services, 0);
        let user = UserId::generate();

        for _ in 0..50 {
            let id = services
                .create_movement(user, MovementType::In, &incoming(product, warehouse, supplier, None))
                .unwrap();
            let before = services.projections().stock.quantity(product, warehouse);

            let oks = thread::scope(|scope| {
                let handles: Vec<_> = (0..4).map(|_| scope.spawn(|| services.complete_movement(id))).collect();
                handles.into_iter().map(|h| h.join()).filter(|r| matches!(r, Ok(Ok(())))).count()
            });

            assert_eq!(oks, 1);
            let movement = services.projections().movements.get(&id).unwrap();
            assert_eq!(movement.status, MovementStatus::Completed);
            assert_eq!(services.projections().stock.quantity(product, warehouse), before + 5);
        }

        let rebuilt = AppServices::with_store(store, company()).unwrap();
        assert_eq!(rebuilt.projections().stock.quantity(product, warehouse), 250);
        assert_eq!(services.projections().stock.quantity(product, warehouse), 250);
    }

    #[test]
    fn concurrent_stock_writes_match_a_rebuild() {
        let (store, services) = services();
        let pairs: Vec<_> = (0..8).map(|tag| depot(&services, tag)).collect();

        thread::scope(|scope| {
            for &(product, warehouse, _) in &pairs {
                let services = &services;
                scope.spawn(move || {
                    for counted in 1..=50 {
                        services.set_stock_level(product, warehouse, counted, None).unwrap();
                    }
                });
            }
        });

        let rebuilt = AppServices::with_store(store, company()).unwrap();
        for (product, warehouse, _) in pairs {
            assert_eq!(services.projections().stock.quantity(product, warehouse), 50);
            assert_eq!(rebuilt.projections().stock.quantity(product, warehouse), 50);
            assert_eq!(services.projections().stock.history(product, warehouse).len(), 50);
        }
    }

    #[test]
    fn concurrent_creates_get_distinct_references() {
        let (_, services) = services();
        let (product, warehouse, supplier) = depot(&services, 0);
        let user = UserId::generate();

        thread::scope(|scope| {
            for _ in 0..8 {
                let services = &services;
                scope.spawn(move || {
                    for _ in 0..20 {
                        services
                            .create_movement(user, MovementType::In, &incoming(product, warehouse, supplier, None))
                            .unwrap();
                    }
                });
            }
        });

        let movements = services.projections().movements.list(Default::default());
        let references: HashSet<_> = movements.iter().map(|m| m.reference.clone()).collect();
        assert_eq!(movements.len(), 160);
        assert_eq!(references.len(), 160);
    }

    #[test]
    fn concurrent_duplicate_codes_admit_one() {
        let (_, services) = services();

        let results = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let services = &services;
                    scope.spawn(move || {
                        services.create_packaging_type(&PackagingTypeRequest {
                            name: format!("Carton {i}"),
                            code: "CTN".to_string(),
                            active: true,
                        })
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect::<Vec<_>>()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.field_name() == Some("code")));
        assert_eq!(services.projections().packaging_types.list().len(), 1);
    }

    #[test]
    fn read_models_catch_up_after_an_unseen_append() {
        let (_, services) = services();
        let (product, warehouse, _) = depot(&services, 0);
        services.set_stock_level(product, warehouse, 3, None).unwrap();

        let ledger = StockLedgerId::main();
        services
            .dispatcher
            .dispatch(
                ledger.aggregate_id(),
                streams::STOCK_LEDGER,
                LedgerCommand::SetStockLevel(SetStockLevel {
                    adjustment_id: AdjustmentId::generate(),
                    product_id: product,
                    warehouse_id: warehouse,
                    counted: 10,
                    reason: None,
                    occurred_at: Utc::now(),
                }),
                |a| StockLedger::empty(StockLedgerId::new(a)),
            )
            .unwrap();
        assert_eq!(services.projections().stock.quantity(product, warehouse), 3);

        services.set_stock_level(product, warehouse, 12, None).unwrap();
        assert_eq!(services.projections().stock.quantity(product, warehouse), 12);
        assert_eq!(services.projections().stock.history(product, warehouse).len(), 3);
    }

    #[test]
    fn exhausted_reference_counter_is_a_field_error() {
        let (_, services) = services();
        let (product, warehouse, supplier) = depot(&services, 0);
        let user = UserId::generate();
        let last = format!("IN-{}-{}", Utc::now().date_naive().format("%Y%m%d"), u64::MAX);

        services
            .create_movement(user, MovementType::In, &incoming(product, warehouse, supplier, Some(last)))
            .unwrap();
        let err = services
            .create_movement(user, MovementType::In, &incoming(product, warehouse, supplier, None))
            .unwrap_err();
        assert_eq!(err.field_name(), Some("reference"));
    }
}
