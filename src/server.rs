//! MCP server implementation with tool handlers
//!
//! Implements the `ServerHandler` trait and registers the mailbox, linker,
//! surface and context-menu tools. Handles input validation, orchestration
//! against the core components, and response formatting.
//!
//! All core state lives in one [`CoreState`] behind a single async mutex, so
//! every tool call (dispatch, commit and notify included) completes before
//! the next one starts.

use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, Utc};
use regex::Regex;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{ErrorData, ServerCapabilities, ServerInfo};
use rmcp::{Json, ServerHandler, tool, tool_handler, tool_router};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::actions::{self, MailboxUpdate, ServiceUpdate};
use crate::config::ServerConfig;
use crate::context_menu::ContextMenuService;
use crate::context_menu::collaborators::{ExtensionMenus, SurfaceOwner};
use crate::dispatch::DispatchOutcome;
use crate::errors::{AppError, AppResult};
use crate::headless::Headless;
use crate::linker::{LinkedIdentity, MailboxLinker};
use crate::models::{
    AttachServiceInput, ContextMenuOpenInput, ContextMenuSelectInput, CreateMailboxInput,
    DispatchInput, ExtensionMenusInput, LinkAccountInput, MailboxIdInput, MailboxView, Meta,
    MoveMailboxInput, ServiceRefInput, SurfaceAttachedInput, SurfaceInput, ToolEnvelope,
    UpdateMailboxInput, UpdateServiceInput,
};
use crate::store::{Change, MailboxStore, StoreSnapshot, SubscriptionId};

/// Maximum length of ids, names and other short strings
const MAX_SHORT_CHARS: usize = 128;
/// Maximum length of avatar references (URLs or data URIs)
const MAX_AVATAR_CHARS: usize = 8_192;
/// Renderer suggestions accepted per dictionary for one click
const MAX_SUGGESTIONS: usize = 32;
/// Longest accepted token lifetime (one year)
const MAX_TOKEN_LIFETIME_SECS: u64 = 31_536_000;

static COLOR_PATTERN: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(
        r"^(#[0-9a-fA-F]{3}|#[0-9a-fA-F]{6}|#[0-9a-fA-F]{8}|rgba?\(\s*\d{1,3}\s*,\s*\d{1,3}\s*,\s*\d{1,3}\s*(,\s*(0|1|0?\.\d+)\s*)?\))$",
    )
});

static ACTION_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*\.[a-z][a-z0-9_]*$"));

/// Everything the tools mutate, owned by one lock
struct CoreState {
    store: MailboxStore,
    /// Debug-logging store subscriber, released on shutdown
    log_subscription: SubscriptionId,
    linker: MailboxLinker,
    menus: ContextMenuService,
}

/// Wavebox core MCP server
///
/// Holds shared configuration, the core state and the headless collaborator
/// handles. Implements MCP tool handlers via `#[tool]` attribute macro and
/// `ServerHandler` trait.
#[derive(Clone)]
pub struct WaveboxServer {
    /// Server config (state file, menu settings, timeouts)
    config: Arc<ServerConfig>,
    /// Store, linker and menu service (protected by mutex)
    core: Arc<Mutex<CoreState>>,
    /// Surface table, extension registry and effect log shared with the
    /// menu service
    headless: Headless,
    /// Tool router for dispatching MCP tool calls
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl WaveboxServer {
    /// Create a new MCP server instance
    ///
    /// Seeds the store from `WAVEBOX_STATE_FILE` when it exists and starts
    /// the context-menu service's surface listener.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the state file cannot be read or parsed, and the
    /// store's validation error if the snapshot violates an invariant.
    pub fn new(config: ServerConfig) -> AppResult<Self> {
        let mut store = match config.state_file.as_deref() {
            Some(path) if path.exists() => load_state(path)?,
            _ => MailboxStore::new(),
        };
        let log_subscription = store.subscribe(|change| match change.change {
            Change::Mailbox(mailbox) => {
                debug!(revision = change.revision, mailbox_id = %mailbox.id, "mailbox committed");
            }
            Change::Service(service) => {
                debug!(revision = change.revision, service_id = %service.id, "service committed");
            }
            Change::MailboxRemoved(mailbox_id) => {
                debug!(revision = change.revision, %mailbox_id, "mailbox removed");
            }
            Change::ServiceRemoved {
                mailbox_id,
                service_id,
            } => {
                debug!(revision = change.revision, %mailbox_id, %service_id, "service removed");
            }
            Change::Reordered => debug!(revision = change.revision, "mailboxes reordered"),
            Change::Loaded => debug!(revision = change.revision, "store loaded"),
        });

        let headless = Headless::new(config.spellcheck_languages.clone(), Default::default());
        let mut menus = ContextMenuService::new(
            config.menu.clone(),
            Duration::from_millis(config.menu_teardown_ms),
            Duration::from_millis(config.binding_timeout_ms),
            headless.collaborators(),
        );
        menus.start();
        if store.is_empty() {
            info!("wavebox core ready with an empty store");
        } else {
            info!(mailboxes = store.len(), "wavebox core ready");
        }

        Ok(Self {
            config: Arc::new(config),
            core: Arc::new(Mutex::new(CoreState {
                store,
                log_subscription,
                linker: MailboxLinker::new(),
                menus,
            })),
            headless,
            tool_router: Self::tool_router(),
        })
    }

    /// Tool: List mailboxes in display order
    #[tool(
        name = "mailbox_list",
        description = "List mailboxes with their services in display order"
    )]
    async fn list_mailboxes(&self) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        let result = {
            let core = self.core.lock().await;
            core.store
                .all()
                .map(|mailbox| {
                    core.store
                        .services_of(&mailbox.id)
                        .map(|services| MailboxView::new(mailbox, services))
                })
                .collect::<AppResult<Vec<_>>>()
        };
        finalize_tool(
            started,
            result.and_then(|views| {
                let summary = format!("{} mailbox(es)", views.len());
                Ok((summary, to_value(&views)?))
            }),
        )
    }

    /// Tool: Get one mailbox
    #[tool(name = "mailbox_get", description = "Get a mailbox with its services")]
    async fn get_mailbox(
        &self,
        Parameters(input): Parameters<MailboxIdInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.get_mailbox_impl(&input.mailbox_id)
                .await
                .map(|data| ("Mailbox retrieved".to_owned(), data)),
        )
    }

    /// Tool: Create a mailbox with its default service
    #[tool(
        name = "mailbox_create",
        description = "Create a mailbox of a provider type with its default service"
    )]
    async fn create_mailbox(
        &self,
        Parameters(input): Parameters<CreateMailboxInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.create_mailbox_impl(input)
                .await
                .map(|data| ("Mailbox created".to_owned(), data)),
        )
    }

    /// Tool: Remove a mailbox and all of its services
    ///
    /// Identities linked to the removed services are dropped.
    #[tool(
        name = "mailbox_remove",
        description = "Remove a mailbox and its services"
    )]
    async fn remove_mailbox(
        &self,
        Parameters(input): Parameters<MailboxIdInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        let result = async {
            validate_id(&input.mailbox_id, "mailbox_id")?;
            let mut core = self.core.lock().await;
            let CoreState { store, linker, .. } = &mut *core;
            actions::remove_mailbox(store, &input.mailbox_id)?;
            let unlinked = linker.prune(store);
            Ok::<_, AppError>((
                "Mailbox removed".to_owned(),
                json!({ "mailbox_id": input.mailbox_id, "unlinked_identities": unlinked }),
            ))
        }
        .await;
        finalize_tool(started, result)
    }

    /// Tool: Move a mailbox in display order
    #[tool(name = "mailbox_move", description = "Move a mailbox to a new position")]
    async fn move_mailbox(
        &self,
        Parameters(input): Parameters<MoveMailboxInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        let result = async {
            validate_id(&input.mailbox_id, "mailbox_id")?;
            let mut core = self.core.lock().await;
            actions::move_mailbox(&mut core.store, &input.mailbox_id, input.index)?;
            let order: Vec<&str> = core.store.all().map(|m| m.id.as_str()).collect();
            Ok::<_, AppError>(("Mailbox moved".to_owned(), json!({ "order": order })))
        }
        .await;
        finalize_tool(started, result)
    }

    /// Tool: Typed mailbox update
    ///
    /// Applies each present field through its own action creator, in a
    /// fixed order, and reports one outcome per field.
    #[tool(
        name = "mailbox_update",
        description = "Update mailbox display attributes and window behavior; all fields apply or none do"
    )]
    async fn update_mailbox(
        &self,
        Parameters(input): Parameters<UpdateMailboxInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.update_mailbox_impl(input)
                .await
                .map(|data| ("Mailbox updated".to_owned(), data)),
        )
    }

    /// Tool: Attach a capability service
    #[tool(
        name = "service_attach",
        description = "Attach a capability service (communication, calendar, messenger, storage) to a mailbox"
    )]
    async fn attach_service(
        &self,
        Parameters(input): Parameters<AttachServiceInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        let result = async {
            validate_id(&input.mailbox_id, "mailbox_id")?;
            let mut core = self.core.lock().await;
            let service_id =
                actions::add_service(&mut core.store, &input.mailbox_id, input.capability)?;
            Ok::<_, AppError>((
                "Service attached".to_owned(),
                json!({ "mailbox_id": input.mailbox_id, "service_id": service_id }),
            ))
        }
        .await;
        finalize_tool(started, result)
    }

    /// Tool: Remove a capability service
    #[tool(
        name = "service_remove",
        description = "Remove a capability service from a mailbox"
    )]
    async fn remove_service(
        &self,
        Parameters(input): Parameters<ServiceRefInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        let result = async {
            validate_service_ref(&input)?;
            let mut core = self.core.lock().await;
            let CoreState { store, linker, .. } = &mut *core;
            actions::remove_service(store, &input.mailbox_id, &input.service_id)?;
            let unlinked = linker.prune(store);
            Ok::<_, AppError>((
                "Service removed".to_owned(),
                json!({ "service_id": input.service_id, "unlinked_identities": unlinked }),
            ))
        }
        .await;
        finalize_tool(started, result)
    }

    /// Tool: Typed service update
    #[tool(
        name = "service_update",
        description = "Update service display name, avatar, unread count, settings or position; all fields apply or none do"
    )]
    async fn update_service(
        &self,
        Parameters(input): Parameters<UpdateServiceInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.update_service_impl(input)
                .await
                .map(|data| ("Service updated".to_owned(), data)),
        )
    }

    /// Tool: Dispatch a named action
    ///
    /// Actions the resolved reducer chain does not define are a no-op and
    /// reported as `unsupported`, not as an error.
    #[tool(
        name = "mailbox_dispatch",
        description = "Dispatch a named action to a mailbox or one of its services"
    )]
    async fn dispatch_action(
        &self,
        Parameters(input): Parameters<DispatchInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        let result = async {
            validate_dispatch_input(&input)?;
            let payload = payload_object(input.payload)?;
            let mut core = self.core.lock().await;
            let outcome = actions::reduce(
                &mut core.store,
                &input.action,
                &input.mailbox_id,
                input.service_id.as_deref(),
                payload,
            )?;
            Ok::<_, AppError>((outcome_summary(&input.action, outcome), to_value(&outcome)?))
        }
        .await;
        finalize_tool(started, result)
    }

    /// Tool: Link an external account to a service
    ///
    /// The token is kept in memory by the linker; only the opaque
    /// reference is stored on the service.
    #[tool(
        name = "mailbox_link_account",
        description = "Link an external account identity to a service"
    )]
    async fn link_account(
        &self,
        Parameters(input): Parameters<LinkAccountInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.link_account_impl(input)
                .await
                .map(|data| ("Account linked".to_owned(), data)),
        )
    }

    /// Tool: Remove a service's account link
    #[tool(
        name = "mailbox_unlink_account",
        description = "Remove the external account linked to a service"
    )]
    async fn unlink_account(
        &self,
        Parameters(input): Parameters<ServiceRefInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        let result = async {
            validate_service_ref(&input)?;
            let mut core = self.core.lock().await;
            let CoreState { store, linker, .. } = &mut *core;
            let unlinked = linker.unlink(store, &input.mailbox_id, &input.service_id)?;
            let summary = if unlinked {
                "Account unlinked"
            } else {
                "Service had no linked account"
            };
            Ok::<_, AppError>((summary.to_owned(), json!({ "unlinked": unlinked })))
        }
        .await;
        finalize_tool(started, result)
    }

    /// Tool: A content surface was created
    ///
    /// Registers the intent to bind a context menu once the surface is
    /// attached to a window.
    #[tool(
        name = "surface_created",
        description = "Report a newly created content surface"
    )]
    async fn surface_created(
        &self,
        Parameters(input): Parameters<SurfaceInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        let (registered, listening, pending) = {
            let mut core = self.core.lock().await;
            let registered = core.menus.surface_created(input.surface_id, Instant::now());
            (
                registered,
                core.menus.is_listening(),
                core.menus.binder().pending_count(),
            )
        };
        let summary = if registered {
            "Bind intent registered"
        } else if listening {
            "Surface already known"
        } else {
            "Context menus are not listening"
        };
        finalize_tool(
            started,
            Ok((
                summary.to_owned(),
                json!({ "registered": registered, "pending_surfaces": pending }),
            )),
        )
    }

    /// Tool: A content surface finished attaching to its window
    #[tool(
        name = "surface_attached",
        description = "Report that a content surface is attached to a window"
    )]
    async fn surface_attached(
        &self,
        Parameters(input): Parameters<SurfaceAttachedInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        let owner = if input.hosted {
            SurfaceOwner::Hosted(input.window_id)
        } else {
            SurfaceOwner::TopLevel(input.window_id)
        };
        self.headless.windows.attach(input.surface_id, owner);
        let binding = {
            let mut core = self.core.lock().await;
            core.menus.surface_attached(input.surface_id, Instant::now())
        };
        let summary = if binding.is_some() {
            "Context menu bound"
        } else {
            "No binding created"
        };
        finalize_tool(
            started,
            to_value(&binding).map(|data| (summary.to_owned(), json!({ "binding": data }))),
        )
    }

    /// Tool: A content surface was destroyed
    #[tool(
        name = "surface_destroyed",
        description = "Report that a content surface was destroyed"
    )]
    async fn surface_destroyed(
        &self,
        Parameters(input): Parameters<SurfaceInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        self.headless.windows.destroy(input.surface_id);
        let tracked = self.headless.windows.surface_count();
        let (unbound, bound) = {
            let mut core = self.core.lock().await;
            let unbound = core.menus.surface_destroyed(input.surface_id);
            (unbound, core.menus.binder().bound_count())
        };
        finalize_tool(
            started,
            Ok((
                "Surface released".to_owned(),
                json!({
                    "unbound": unbound,
                    "bound_surfaces": bound,
                    "tracked_surfaces": tracked,
                }),
            )),
        )
    }

    /// Tool: Native right-click on a surface
    ///
    /// Builds the menu and returns the template shown, or `shown: false`
    /// when the surface is unbound or has no owning window.
    #[tool(
        name = "context_menu_open",
        description = "Build and show the context menu for a right-click"
    )]
    async fn open_context_menu(
        &self,
        Parameters(input): Parameters<ContextMenuOpenInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, self.open_context_menu_impl(input).await)
    }

    /// Tool: Click on an item of the displayed menu
    #[tool(
        name = "context_menu_select",
        description = "Select an item of the displayed context menu"
    )]
    async fn select_context_menu(
        &self,
        Parameters(input): Parameters<ContextMenuSelectInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        let result = async {
            validate_id(&input.item_id, "item_id")?;
            let outcome = {
                let mut core = self.core.lock().await;
                core.menus.select(&input.item_id)?
            };
            let effects = to_value(&self.headless.effects.take())?;
            Ok::<_, AppError>((
                "Menu item handled".to_owned(),
                json!({ "outcome": outcome, "effects": effects }),
            ))
        }
        .await;
        finalize_tool(started, result)
    }

    /// Tool: The native menu widget closed
    ///
    /// Starts the teardown grace timer; teardown runs when it elapses unless
    /// a selection tore the menu down first.
    #[tool(
        name = "context_menu_closed",
        description = "Report that the native context menu closed"
    )]
    async fn context_menu_closed(&self) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        let (deadline, phase) = {
            let mut core = self.core.lock().await;
            let deadline = core.menus.menu_closed(Instant::now());
            (deadline, core.menus.phase())
        };
        if let Some(deadline) = deadline {
            let core = Arc::clone(&self.core);
            tokio::spawn(async move {
                tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
                core.lock().await.menus.tick(Instant::now());
            });
        }
        let teardown_in_ms = deadline.map(|d| duration_ms_between(Instant::now(), d));
        finalize_tool(
            started,
            Ok((
                if deadline.is_some() { "Teardown scheduled" } else { "No menu displayed" }.to_owned(),
                json!({ "phase": phase, "teardown_in_ms": teardown_in_ms }),
            )),
        )
    }

    /// Tool: Replace an extension's context-menu items
    #[tool(
        name = "extensions_set_context_menus",
        description = "Register or replace the context-menu items of one extension"
    )]
    async fn set_extension_menus(
        &self,
        Parameters(input): Parameters<ExtensionMenusInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        let result = (|| -> AppResult<(String, Value)> {
            validate_id(&input.extension_id, "extension_id")?;
            validate_text(&input.name, 1, MAX_SHORT_CHARS, "name")?;
            for item in &input.items {
                validate_id(&item.menu_id, "menu_id")?;
                validate_text(&item.title, 0, MAX_SHORT_CHARS, "title")?;
            }
            let count = input.items.len();
            self.headless.extensions.set_menus(
                &input.extension_id,
                ExtensionMenus {
                    name: input.name,
                    icon: input.icon,
                    items: input.items,
                },
            );
            Ok((
                format!("{count} item(s) registered"),
                json!({
                    "extension_id": input.extension_id,
                    "extensions": self.headless.extensions.extension_count(),
                }),
            ))
        })();
        finalize_tool(started, result)
    }
}

/// MCP server handler implementation
///
/// Provides server info and capabilities to MCP client.
#[tool_handler(router = self.tool_router)]
impl ServerHandler for WaveboxServer {
    fn get_info(&self) -> ServerInfo {
        let mut info = ServerInfo::default();
        info.instructions = Some(
            "Wavebox core: mailbox/service state with namespaced reducer actions, account linking, and context-menu construction for content surfaces.".to_owned(),
        );
        info.capabilities = ServerCapabilities::builder().enable_tools().build();
        info
    }
}

/// Tool implementation methods
///
/// Private methods handle the actual business logic for each tool, separated
/// from the public `#[tool]` methods that handle response formatting.
impl WaveboxServer {
    async fn get_mailbox_impl(&self, mailbox_id: &str) -> AppResult<Value> {
        validate_id(mailbox_id, "mailbox_id")?;
        let core = self.core.lock().await;
        let mailbox = core.store.get(mailbox_id)?;
        let services = core.store.services_of(mailbox_id)?;
        let mut links = Vec::new();
        for service in &services {
            if let Some(identity) = core.linker.resolve(&core.store, mailbox_id, &service.id)? {
                let expired = identity.expires_at.is_some_and(|at| at <= Utc::now());
                links.push(json!({
                    "service_id": service.id,
                    "account_email": identity.account_email,
                    "expired": expired,
                }));
            }
        }
        let mut view = to_value(&MailboxView::new(mailbox, services))?;
        if let Some(object) = view.as_object_mut() {
            object.insert("links".to_owned(), Value::Array(links));
        }
        Ok(view)
    }

    async fn create_mailbox_impl(&self, input: CreateMailboxInput) -> AppResult<Value> {
        if let Some(name) = &input.name {
            validate_text(name, 1, MAX_SHORT_CHARS, "name")?;
        }
        if let Some(container_id) = &input.container_id {
            validate_id(container_id, "container_id")?;
        }
        let mut core = self.core.lock().await;
        let mailbox_id = actions::create_mailbox(
            &mut core.store,
            input.mailbox_type,
            input.container_id,
            input.name,
        )?;
        let mailbox = core.store.get(&mailbox_id)?;
        Ok(json!({
            "mailbox_id": mailbox_id,
            "default_service_id": mailbox.services.first(),
            "partition": MailboxLinker::partition_for(&mailbox_id),
        }))
    }

    async fn update_mailbox_impl(&self, input: UpdateMailboxInput) -> AppResult<Value> {
        validate_id(&input.mailbox_id, "mailbox_id")?;
        if let Some(name) = &input.name {
            validate_text(name, 0, MAX_SHORT_CHARS, "name")?;
        }
        if let Some(color) = input.color.as_deref().filter(|c| !c.is_empty()) {
            validate_color(color)?;
        }
        if let Some(avatar) = &input.avatar {
            validate_text(avatar, 0, MAX_AVATAR_CHARS, "avatar")?;
        }

        let mut updates = Vec::new();
        if let Some(name) = input.name {
            updates.push(MailboxUpdate::Name(name));
        }
        if let Some(color) = input.color {
            updates.push(MailboxUpdate::Color(non_blank(color)));
        }
        if let Some(avatar) = input.avatar {
            updates.push(MailboxUpdate::Avatar(non_blank(avatar)));
        }
        if let Some(value) = input.open_in_background {
            updates.push(MailboxUpdate::OpenInBackground(value));
        }
        if let Some(value) = input.show_unread_badge {
            updates.push(MailboxUpdate::ShowUnreadBadge(value));
        }
        if updates.is_empty() {
            return Err(AppError::invalid("no mailbox fields to update"));
        }

        let mut core = self.core.lock().await;
        let outcomes = actions::update_mailbox(&mut core.store, &input.mailbox_id, updates)?;
        Ok(json!({ "mailbox_id": input.mailbox_id, "outcomes": outcome_map(outcomes)? }))
    }

    async fn update_service_impl(&self, input: UpdateServiceInput) -> AppResult<Value> {
        validate_id(&input.mailbox_id, "mailbox_id")?;
        validate_id(&input.service_id, "service_id")?;
        if let Some(name) = &input.display_name {
            validate_text(name, 0, MAX_SHORT_CHARS, "display_name")?;
        }
        if let Some(avatar) = &input.avatar {
            validate_text(avatar, 0, MAX_AVATAR_CHARS, "avatar")?;
        }
        if let Some(settings) = &input.settings {
            for key in settings.keys() {
                validate_text(key, 1, MAX_SHORT_CHARS, "settings key")?;
            }
        }

        let mut updates = Vec::new();
        if let Some(name) = input.display_name {
            updates.push(ServiceUpdate::DisplayName(non_blank(name)));
        }
        if let Some(avatar) = input.avatar {
            updates.push(ServiceUpdate::Avatar(non_blank(avatar)));
        }
        if let Some(count) = input.unread_count {
            updates.push(ServiceUpdate::UnreadCount(Some(count)));
        }
        for (key, value) in input.settings.unwrap_or_default() {
            let value = (!value.is_null()).then_some(value);
            updates.push(ServiceUpdate::Setting { key, value });
        }
        if let Some(index) = input.index {
            updates.push(ServiceUpdate::Index(index));
        }
        if updates.is_empty() {
            return Err(AppError::invalid("no service fields to update"));
        }

        let mut core = self.core.lock().await;
        let outcomes = actions::update_service(
            &mut core.store,
            &input.mailbox_id,
            &input.service_id,
            updates,
        )?;
        Ok(json!({ "service_id": input.service_id, "outcomes": outcome_map(outcomes)? }))
    }

    async fn link_account_impl(&self, input: LinkAccountInput) -> AppResult<Value> {
        validate_id(&input.mailbox_id, "mailbox_id")?;
        validate_id(&input.service_id, "service_id")?;
        if let Some(email) = &input.account_email {
            validate_text(email, 3, 320, "account_email")?;
        }
        if input.access_token.trim().is_empty() || input.access_token.len() > 16_384 {
            return Err(AppError::invalid("access_token must be 1..16384 characters"));
        }
        validate_no_controls(&input.access_token, "access_token")?;
        let expires_at = match input.expires_in_seconds {
            Some(secs) if !(1..=MAX_TOKEN_LIFETIME_SECS).contains(&secs) => {
                return Err(AppError::invalid(format!(
                    "expires_in_seconds must be in range 1..{MAX_TOKEN_LIFETIME_SECS}"
                )));
            }
            Some(secs) => {
                let secs = i64::try_from(secs)
                    .map_err(|_| AppError::invalid("expires_in_seconds out of range"))?;
                Some(Utc::now() + ChronoDuration::seconds(secs))
            }
            None => None,
        };

        let mut core = self.core.lock().await;
        let CoreState { store, linker, .. } = &mut *core;
        let provider = store.get(&input.mailbox_id)?.mailbox_type();
        let identity = LinkedIdentity::new(
            provider,
            input.account_email,
            SecretString::new(input.access_token.into()),
            expires_at,
        );
        let auth_ref = linker.link(store, &input.mailbox_id, &input.service_id, identity)?;
        let expired = linker.is_expired(&auth_ref, Utc::now());
        Ok(json!({
            "linked_identities": linker.len(),
            "service_id": input.service_id,
            "auth_ref": auth_ref,
            "expired": expired,
            "partition": MailboxLinker::partition_for(&input.mailbox_id),
        }))
    }

    async fn open_context_menu_impl(
        &self,
        input: ContextMenuOpenInput,
    ) -> AppResult<(String, Value)> {
        validate_click_params(&input)?;
        self.headless
            .windows
            .set_history(input.surface_id, input.can_go_back, input.can_go_forward);
        self.headless.spelling.offer_suggestions(
            input.params.misspelled_word.as_deref(),
            &input.dictionary_suggestions,
        );
        let template = {
            let mut core = self.core.lock().await;
            core.menus
                .launch_menu(input.surface_id, input.params)?
                .map(to_value)
                .transpose()?
        };
        let effects = to_value(&self.headless.effects.take())?;
        let summary = match &template {
            Some(items) => format!(
                "Context menu shown with {} entr(ies)",
                items.as_array().map_or(0, Vec::len)
            ),
            None => "No context menu shown".to_owned(),
        };
        Ok((
            summary,
            json!({
                "shown": template.is_some(),
                "template": template,
                "effects": effects,
            }),
        ))
    }

    /// Write the current store snapshot to the configured state file
    ///
    /// # Errors
    ///
    /// Returns `Internal` if serialization or the write fails.
    pub async fn persist(&self) -> AppResult<()> {
        let Some(path) = self.config.state_file.as_deref() else {
            return Ok(());
        };
        let snapshot = self.core.lock().await.store.snapshot();
        let body = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| AppError::Internal(format!("serialization failure: {e}")))?;
        std::fs::write(path, body).map_err(|e| {
            AppError::Internal(format!("cannot write state file {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), mailboxes = snapshot.mailboxes.len(), "state saved");
        Ok(())
    }

    /// Stop the surface listener and release any open menu
    pub async fn shutdown(&self) {
        let mut core = self.core.lock().await;
        core.menus.shutdown();
        let subscription = core.log_subscription;
        core.store.unsubscribe(subscription);
    }
}

/// Read and validate a store snapshot from disk
fn load_state(path: &Path) -> AppResult<MailboxStore> {
    let raw = std::fs::read(path).map_err(|e| {
        AppError::Internal(format!("cannot read state file {}: {e}", path.display()))
    })?;
    let snapshot: StoreSnapshot = serde_json::from_slice(&raw).map_err(|e| {
        AppError::Internal(format!("invalid state file {}: {e}", path.display()))
    })?;
    MailboxStore::from_snapshot(snapshot)
}

/// Calculate elapsed milliseconds
fn duration_ms(started: Instant) -> u64 {
    duration_ms_between(started, Instant::now())
}

fn duration_ms_between(from: Instant, to: Instant) -> u64 {
    to.saturating_duration_since(from)
        .as_millis()
        .min(u128::from(u64::MAX)) as u64
}

/// Build a standardized MCP tool response envelope from business logic output
fn finalize_tool<T>(
    started: Instant,
    result: AppResult<(String, T)>,
) -> Result<Json<ToolEnvelope<T>>, ErrorData>
where
    T: schemars::JsonSchema,
{
    match result {
        Ok((summary, data)) => Ok(Json(ToolEnvelope {
            summary,
            data,
            meta: Meta::now(duration_ms(started)),
        })),
        Err(e) => {
            if e.is_soft() {
                debug!(error = %e, "tool call had no effect");
            } else {
                warn!(error = %e, "tool call failed");
            }
            Err(e.to_error_data())
        }
    }
}

fn to_value<T: serde::Serialize + ?Sized>(value: &T) -> AppResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| AppError::Internal(format!("serialization failure: {e}")))
}

fn outcome_summary(action: &str, outcome: DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::Applied { level, .. } => format!("{action} applied by {level} reducer"),
        DispatchOutcome::Unchanged { .. } => format!("{action} left state unchanged"),
        DispatchOutcome::Unsupported => format!("{action} is not supported here; ignored"),
    }
}

/// Empty strings clear optional attributes
fn non_blank(value: String) -> Option<String> {
    Some(value).filter(|v| !v.trim().is_empty())
}

fn outcome_map(
    outcomes: Vec<(String, DispatchOutcome)>,
) -> AppResult<serde_json::Map<String, Value>> {
    outcomes
        .into_iter()
        .map(|(field, outcome)| -> AppResult<(String, Value)> {
            Ok((field, to_value(&outcome)?))
        })
        .collect()
}

/// Validate an identifier-like value (mailbox, service, item, extension ids)
fn validate_id(value: &str, field: &str) -> AppResult<()> {
    validate_text(value, 1, MAX_SHORT_CHARS, field)?;
    if value.trim() != value {
        return Err(AppError::InvalidInput(format!(
            "{field} must not have surrounding whitespace"
        )));
    }
    Ok(())
}

/// Validate length (in chars) and reject control characters
fn validate_text(value: &str, min: usize, max: usize, field: &str) -> AppResult<()> {
    validate_chars(value.chars().count(), min, max, field)?;
    validate_no_controls(value, field)
}

/// Reject control characters in user-provided values
fn validate_no_controls(value: &str, field: &str) -> AppResult<()> {
    if value.chars().any(char::is_control) {
        return Err(AppError::InvalidInput(format!(
            "{field} must not contain control characters"
        )));
    }
    Ok(())
}

/// Validate numeric value in range
fn validate_chars(value: usize, min: usize, max: usize, field: &str) -> AppResult<()> {
    if value < min || value > max {
        return Err(AppError::InvalidInput(format!(
            "{field} must be in range {min}..{max}"
        )));
    }
    Ok(())
}

fn validate_service_ref(input: &ServiceRefInput) -> AppResult<()> {
    validate_id(&input.mailbox_id, "mailbox_id")?;
    validate_id(&input.service_id, "service_id")
}

fn validate_color(color: &str) -> AppResult<()> {
    let pattern = COLOR_PATTERN
        .as_ref()
        .map_err(|e| AppError::Internal(format!("color pattern: {e}")))?;
    if !pattern.is_match(color) {
        return Err(AppError::InvalidInput(format!(
            "color '{color}' must be #rgb, #rrggbb, #rrggbbaa, rgb(...) or rgba(...)"
        )));
    }
    Ok(())
}

fn validate_dispatch_input(input: &DispatchInput) -> AppResult<()> {
    validate_id(&input.mailbox_id, "mailbox_id")?;
    if let Some(service_id) = &input.service_id {
        validate_id(service_id, "service_id")?;
    }
    let pattern = ACTION_PATTERN
        .as_ref()
        .map_err(|e| AppError::Internal(format!("action pattern: {e}")))?;
    if input.action.len() > MAX_SHORT_CHARS || !pattern.is_match(&input.action) {
        return Err(AppError::InvalidInput(
            "action must look like 'namespace.operation' in snake_case".to_owned(),
        ));
    }
    if !(input.payload.is_object() || input.payload.is_null()) {
        return Err(AppError::invalid("payload must be a JSON object"));
    }
    if input.action == "mailbox.set_color" {
        if let Some(color) = input.payload.get("color").and_then(Value::as_str) {
            validate_color(color)?;
        }
    }
    Ok(())
}

/// Reducers decode object payloads; an omitted or `null` payload is `{}`
fn payload_object(payload: Value) -> AppResult<Value> {
    match payload {
        Value::Null => Ok(Value::Object(serde_json::Map::new())),
        Value::Object(_) => Ok(payload),
        _ => Err(AppError::invalid("payload must be a JSON object")),
    }
}

fn validate_click_params(input: &ContextMenuOpenInput) -> AppResult<()> {
    let params = &input.params;
    for (value, field) in [
        (params.link_url.as_deref(), "link_url"),
        (params.src_url.as_deref(), "src_url"),
        (params.page_url.as_deref(), "page_url"),
        (params.frame_url.as_deref(), "frame_url"),
    ] {
        if let Some(value) = value {
            validate_text(value, 0, MAX_AVATAR_CHARS, field)?;
        }
    }
    if let Some(word) = &params.misspelled_word {
        validate_text(word, 0, MAX_SHORT_CHARS, "misspelled_word")?;
    }
    for (language, suggestions) in &input.dictionary_suggestions {
        validate_id(language, "dictionary_suggestions language")?;
        validate_chars(suggestions.len(), 0, MAX_SUGGESTIONS, "suggestions per language")?;
        for suggestion in suggestions {
            validate_text(suggestion, 1, MAX_SHORT_CHARS, "suggestion")?;
        }
    }
    validate_chars(
        params.selection_text.chars().count(),
        0,
        MAX_AVATAR_CHARS,
        "selection_text",
    )
}
