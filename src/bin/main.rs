//! Duowallet CLI - demo front end over simulated backends
//!
//! Each command restores the session from the session file, runs one
//! operation through the dispatcher and prints the outcome:
//!   duowallet status                 → current identity / status line
//!   duowallet login [--params]       → embedded login, external on fallback
//!   duowallet login-sign             → login if needed, then sign
//!   duowallet login-sign-params      → params login, sign via external wallet
//!   duowallet send [json-array]      → send operations with the live identity
//!   duowallet logout                 → end the session
//!   duowallet serve                  → HTTP API
//!
//! Output format:
//!   --json     Output raw JSON (default for non-tty)
//!   --pretty   Pretty-print JSON (default for tty)

use duowallet::backend::simulated::{LoginScript, PermissionScript, SessionFile, SimulatedEmbedded, SimulatedExternal};
use duowallet::logging::init_logging;
use duowallet::{Backends, Dispatcher, OperationRequest, SessionState, WalletConfig};
use serde_json::{json, Value};
use std::env;
use std::io::IsTerminal;
use std::sync::Arc;
use tracing::{debug, info};

const DEFAULT_EXPRESSION: &str = "0x05010000004254657a6f73205369676e6564204d6573736167653a206d79646170702e636f6d20323032312d30312d31345431353a31363a30345a2048656c6c6f20776f726c6421";
const DEFAULT_DESTINATION: &str = "tz1arY7HNDq17nrZJ7f3sikxuHZgeopsU9xq";

fn default_payload() -> Vec<Value> {
    vec![json!({
        "kind": "transaction",
        "amount": "12345",
        "destination": DEFAULT_DESTINATION,
    })]
}

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("duowallet {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = match opts.command.as_deref() {
        Some("status") => run(&opts, None),
        Some("login") if opts.params => run(&opts, Some(OperationRequest::LoginWithParams)),
        Some("login") => run(&opts, Some(OperationRequest::Login)),
        Some("login-sign") => run(&opts, Some(OperationRequest::Sign { expression: opts.expression() })),
        Some("login-sign-params") => run(&opts, Some(OperationRequest::SignWithParams { expression: opts.expression() })),
        Some("send") => send_request(&opts).and_then(|req| run(&opts, Some(req))),
        Some("logout") => run(&opts, Some(OperationRequest::Logout)),
        Some("serve") => cmd_serve(&opts),
        Some(cmd) => Err(format!("Unknown command: {}", cmd)),
        None => {
            print_usage();
            return;
        }
    };

    let pretty = !opts.json && (opts.pretty || std::io::stdout().is_terminal());
    match result {
        Ok(output) => println!("{}", render(&output, pretty)),
        Err(e) => {
            eprintln!("{}", render(&json!({"error": e}), pretty));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, pretty: bool) -> String {
    let rendered = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
    rendered.unwrap_or_else(|_| value.to_string())
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    data: Option<String>,
    app: Option<String>,
    root: Option<String>,
    address: Option<String>,
    name: Option<String>,
    expression: Option<String>,
    other_wallets: bool,
    dismiss: bool,
    params: bool,
    port: Option<u16>,
    json: bool,
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        // Load .env file if present
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let value = value.trim().trim_matches('"');
                    if !value.is_empty() && env::var(key.trim()).is_err() {
                        env::set_var(key.trim(), value);
                    }
                }
            }
        }

        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            let value = args.get(i + 1).cloned();
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--json" => opts.json = true,
                "--pretty" => opts.pretty = true,
                "--params" => opts.params = true,
                "--other-wallets" => opts.other_wallets = true,
                "--dismiss" => opts.dismiss = true,
                "--app" | "-a" => { opts.app = value; i += 1; }
                "--data-dir" | "-d" => { opts.root = value; i += 1; }
                "--address" => { opts.address = value; i += 1; }
                "--name" => { opts.name = value; i += 1; }
                "--expression" | "-e" => { opts.expression = value; i += 1; }
                "--port" | "-p" => { opts.port = value.and_then(|v| v.parse().ok()); i += 1; }
                _ if !arg.starts_with('-') => positional.push(arg.clone()),
                _ => {} // Ignore unknown flags
            }
            i += 1;
        }

        if !positional.is_empty() {
            opts.command = Some(positional.remove(0));
        }
        if !positional.is_empty() {
            opts.data = Some(positional.join(" "));
        }

        if opts.app.is_none() {
            opts.app = env::var("DUOWALLET_APP").ok().filter(|s| !s.is_empty());
        }
        if opts.port.is_none() {
            opts.port = env::var("DUOWALLET_PORT").ok().and_then(|s| s.parse().ok());
        }

        opts
    }

    fn expression(&self) -> String {
        self.expression.clone().unwrap_or_else(|| DEFAULT_EXPRESSION.to_string())
    }

    fn config(&self) -> Result<WalletConfig, String> {
        let app = self.app.clone().unwrap_or_else(|| "duowallet".to_string());
        let mut config = WalletConfig::from_env(app).map_err(|e| e.to_string())?;
        if let Some(root) = &self.root {
            config = config.with_root(root);
        }
        Ok(config)
    }
}

fn send_request(opts: &ParsedArgs) -> Result<OperationRequest, String> {
    let operations = match opts.data.as_deref() {
        Some(raw) => serde_json::from_str::<Vec<Value>>(raw).map_err(|e| format!("Invalid operations JSON: {}", e))?,
        None => default_payload(),
    };
    Ok(OperationRequest::Send { operations })
}

/// Simulated clients sharing one session file.
fn build_backends(opts: &ParsedArgs, config: &WalletConfig) -> (Backends, Arc<SimulatedExternal>) {
    let store = SessionFile::open(config.session_file());
    debug!(path = %store.path().display(), "session file");

    let login = if opts.other_wallets {
        LoginScript::OtherWallets
    } else {
        let address = opts.address.clone().unwrap_or_else(|| duowallet::backend::simulated::DEMO_ADDRESS.into());
        LoginScript::Succeed { address, name: opts.name.clone() }
    };
    let permission = if opts.dismiss {
        PermissionScript::Dismiss
    } else {
        let address = opts
            .address
            .clone()
            .unwrap_or_else(|| duowallet::backend::simulated::DEMO_EXTERNAL_ADDRESS.into());
        PermissionScript::Grant(address)
    };

    let embedded = Arc::new(SimulatedEmbedded::new().with_store(store.clone()).with_login(login));
    let external = Arc::new(SimulatedExternal::new().with_store(store).with_permission(permission));
    (Backends::new(embedded, external.clone()), external)
}

fn run(opts: &ParsedArgs, request: Option<OperationRequest>) -> Result<Value, String> {
    let config = opts.config()?;
    let (backends, _) = build_backends(opts, &config);
    let rt = tokio::runtime::Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async {
        let mut dispatcher = Dispatcher::new(backends, SessionState::new(), config);
        dispatcher.reconcile().await.map_err(|e| e.to_string())?;

        let result = match request {
            Some(request) => {
                let op = request.name();
                let result = dispatcher.dispatch(request).await;
                info!(op, ?result, "dispatched");
                Some(result)
            }
            None => None,
        };

        let snapshot = dispatcher.session().snapshot();
        Ok::<Value, String>(json!({
            "status": snapshot.status_line(),
            "identity": snapshot.identity,
            "response": snapshot.response,
            "result": result,
        }))
    })
}

#[cfg(not(feature = "server"))]
fn cmd_serve(_opts: &ParsedArgs) -> Result<Value, String> {
    Err("built without the `server` feature".into())
}

#[cfg(feature = "server")]
fn cmd_serve(opts: &ParsedArgs) -> Result<Value, String> {
    use duowallet::server::{create_router, shutdown_signal, spawn_account_listener, AppState};

    let port = opts.port.unwrap_or(8080);
    let config = opts.config()?;
    let app_name = config.app.clone();
    let (backends, external) = build_backends(opts, &config);

    let rt = tokio::runtime::Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async {
        let mut dispatcher = Dispatcher::new(backends, SessionState::new(), config);
        if let Err(e) = dispatcher.reconcile().await {
            // Stays loading; POST /reconcile retries.
            tracing::warn!("startup reconcile failed: {}", e);
        }

        let state = AppState::new(dispatcher, &app_name);
        let listener_task = spawn_account_listener(state.clone(), external.subscribe());
        let router = create_router(state);
        let addr = format!("0.0.0.0:{}", port);

        info!("Duowallet server listening on http://{}", addr);
        info!("  GET  /health     - Health check");
        info!("  GET  /session    - Identity and status");
        info!("  POST /dispatch   - Run an operation");
        debug!("  POST /reconcile  - Retry startup reconcile");

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| format!("Failed to bind: {}", e))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| format!("Server error: {}", e))?;

        listener_task.abort();
        info!("Server stopped");
        Ok::<Value, String>(json!({"status": "stopped"}))
    })
}

fn print_usage() {
    println!(
        r#"duowallet - unified embedded + external wallet session

USAGE:
    duowallet <command> [data] [options]

COMMANDS:
    status                  Show restored identity
    login                   Log in (embedded, external on "other wallets")
    login-sign              Log in if needed, then sign the expression
    login-sign-params       Log in with auth params; sign via external wallet
    send [json-array]       Send operations (default: demo transaction)
    logout                  End the session
    serve                   Start HTTP server

OPTIONS:
    --app, -a <name>        Application name (env: DUOWALLET_APP)
    --data-dir, -d <path>   Session root (env: DUOWALLET_ROOT)
    --params                Login with auth params
    --other-wallets         Embedded wallet declines; use external wallet
    --dismiss               External wallet prompt is closed without answer
    --address <addr>        Address the simulated wallet logs in with
    --name <name>           Display name for the embedded user
    --expression, -e <hex>  Expression to sign
    --port, -p <port>       Server port (default: 8080, env: DUOWALLET_PORT)

OUTPUT OPTIONS:
    --json                  Raw JSON output
    --pretty                Pretty-print JSON
    --version, -V           Print version

ENVIRONMENT:
    DUOWALLET_TEMPLATE          Embedded login template (default: objkt)
    DUOWALLET_CALL_TIMEOUT_MS   Per backend call timeout (default: none)
    DUOWALLET_LOG_JSON=1        JSON logs
"#
    );
}
