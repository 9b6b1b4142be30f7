//! Run command implementation for the Tessera CLI.
//!
//! Builds the module, runs it, and then takes debugger commands from stdin
//! until told to quit.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use tessera_core::{
    BuildExecuteStateMachine, ControlHandle, ControlThread, DylibLoader, EngineConfig,
    MachineSignal, OperationHandle, ProgramRoot, RngType,
    TranslatorOwnershipArbiter,
};

use crate::colors;
use crate::console::TerminalConsole;
use crate::document::{ModuleDocument, element_operation, identifier_name};
use crate::translator::CopyTranslator;

/// Options of `tessera run`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub module: PathBuf,
    pub debug: bool,
    pub seed: Option<u64>,
    pub rng: Option<RngType>,
    pub breakpoints: Vec<u32>,
    pub build_dir: Option<PathBuf>,
}

impl RunOptions {
    fn config(&self) -> EngineConfig {
        let mut config = EngineConfig::from_env();
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(rng) = self.rng {
            config = config.with_rng_type(rng);
        }
        if let Some(dir) = &self.build_dir {
            config = config.with_build_dir(dir);
        }
        config
    }
}

/// A command typed at the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Run,
    Step,
    Pause,
    Resume,
    Abort,
    Break(u32),
    Clear(u32),
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(None);
    };

    let command = match word {
        "run" | "r" => Command::Run,
        "step" | "s" => Command::Step,
        "pause" | "p" => Command::Pause,
        "resume" | "c" => Command::Resume,
        "abort" => Command::Abort,
        "break" | "b" => Command::Break(parse_handle(words.next())?),
        "clear" => Command::Clear(parse_handle(words.next())?),
        "help" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        other => return Err(format!("unknown command '{}' (try 'help')", other)),
    };

    match words.next() {
        Some(extra) => Err(format!("unexpected argument '{}'", extra)),
        None => Ok(Some(command)),
    }
}

fn parse_handle(word: Option<&str>) -> Result<u32, String> {
    let word = word.ok_or_else(|| "missing operation handle".to_string())?;
    word.parse()
        .map_err(|_| format!("invalid operation handle '{}'", word))
}

fn location(element: Option<tessera_core::ElementId>) -> String {
    match element.and_then(element_operation) {
        Some(handle) => format!(" at operation {}", handle.as_u32()),
        None => String::new(),
    }
}

/// Colour and text printed for a signal. Readiness changes print nothing.
pub fn describe(signal: &MachineSignal) -> Option<(&'static str, String)> {
    let line = match signal {
        MachineSignal::Ready { .. } | MachineSignal::Active { .. } => return None,
        MachineSignal::Running => (colors::GREEN, "Running".to_string()),
        MachineSignal::Stopped => (colors::GREEN, "Finished".to_string()),
        MachineSignal::Aborted { element } => (colors::RED, format!("Aborted{}", location(*element))),
        MachineSignal::PausedOnUserRequest { element } => {
            (colors::YELLOW, format!("Paused{}", location(*element)))
        }
        MachineSignal::PausedAtInstructionBreakpoint { element } => {
            (colors::YELLOW, format!("Breakpoint hit{}", location(*element)))
        }
        MachineSignal::PausedOnVariableUpdate {
            element,
            identifier,
        } => (
            colors::YELLOW,
            format!("{} updated{}", identifier_name(*identifier), location(*element)),
        ),
        MachineSignal::Resumed => (colors::DIM, "Resumed".to_string()),
        MachineSignal::DirectoryIsReadOnly { path } => (
            colors::RED,
            format!("Cannot write to build directory {}", path.display()),
        ),
        MachineSignal::NowShutdown => (colors::DIM, "Shut down".to_string()),
    };
    Some(line)
}

fn print_help() {
    println!("{}Commands:{}", colors::BOLD, colors::RESET);
    println!("  run            build if needed and run");
    println!("  step           execute one operation");
    println!("  pause          pause the running model");
    println!("  resume         continue after a pause");
    println!("  abort          stop the model");
    println!("  break H        break at operation H");
    println!("  clear H        remove the breakpoint at operation H");
    println!("  quit           shut down and exit");
}

fn breakpoint_list(document: &ModuleDocument) -> String {
    document
        .breakpoints()
        .iter()
        .map(|handle| handle.as_u32().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Run a blocking handle call off the async runtime.
async fn call<R, F>(handle: &ControlHandle, request: F) -> anyhow::Result<R>
where
    R: Send + 'static,
    F: FnOnce(&ControlHandle) -> tessera_core::Result<R> + Send + 'static,
{
    let handle = handle.clone();
    Ok(tokio::task::spawn_blocking(move || request(&handle)).await??)
}

struct Session {
    handle: ControlHandle,
    document: Arc<ModuleDocument>,
    root: Arc<dyn ProgramRoot>,
    debug: bool,
}

impl Session {
    async fn dispatch(&self, command: Command) -> anyhow::Result<()> {
        let root = Arc::clone(&self.root);
        let debug = self.debug;

        match command {
            Command::Run => call(&self.handle, move |h| h.run(root, debug, None)).await?,
            Command::Step => call(&self.handle, move |h| h.step(root)).await?,
            Command::Pause => call(&self.handle, ControlHandle::pause).await?,
            Command::Resume => call(&self.handle, |h| h.resume(None)).await?,
            Command::Abort => call(&self.handle, ControlHandle::abort).await?,
            Command::Break(handle) => {
                let element = self.document.set_breakpoint(OperationHandle::new(handle), true);
                call(&self.handle, move |h| h.set_instruction_breakpoint(element, true)).await?;
                println!("Breakpoint set at operation {}", handle);
                if !debug {
                    println!(
                        "{}Breakpoints only take effect with --debug{}",
                        colors::DIM,
                        colors::RESET
                    );
                }
            }
            Command::Clear(handle) => {
                let element = self.document.set_breakpoint(OperationHandle::new(handle), false);
                call(&self.handle, move |h| h.clear_instruction_breakpoint(element)).await?;
                println!("Breakpoint cleared at operation {}", handle);
            }
            Command::Help => print_help(),
            Command::Quit => self.handle.shutdown_now()?,
        }
        Ok(())
    }
}

/// Execute the run command.
pub async fn execute(options: RunOptions) -> anyhow::Result<()> {
    if !options.module.is_file() {
        anyhow::bail!("Module not found: {}", options.module.display());
    }
    let module = options.module.canonicalize()?;
    let config = options.config();

    let document = Arc::new(ModuleDocument::new(&module).with_echo(true));
    for handle in &options.breakpoints {
        document.set_breakpoint(OperationHandle::new(*handle), true);
    }
    let root: Arc<dyn ProgramRoot> = document.clone();

    let arbiter = TranslatorOwnershipArbiter::new(Arc::new(CopyTranslator::new(&module)));
    let (machine, events) = BuildExecuteStateMachine::new(
        config,
        arbiter,
        Box::new(DylibLoader::new()),
        Arc::new(TerminalConsole),
    );
    let thread = ControlThread::spawn(machine, events)?;
    let handle = thread.handle();
    let mut signals = handle.subscribe();

    println!(
        "\n{}Tessera{} - {}{}{} ({})",
        colors::BOLD,
        colors::RESET,
        colors::CYAN,
        module.display(),
        colors::RESET,
        if options.debug { "debug" } else { "release" }
    );
    let breakpoints = breakpoint_list(&document);
    if !breakpoints.is_empty() {
        println!("Breakpoints: {}", breakpoints);
    }
    println!("{}", "─".repeat(50));
    println!(
        "{}Type 'help' for commands, Ctrl+C to stop{}",
        colors::DIM,
        colors::RESET
    );

    let session = Session {
        handle: handle.clone(),
        document,
        root,
        debug: options.debug,
    };
    session.dispatch(Command::Run).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            signal = signals.recv() => match signal {
                Ok(signal) => {
                    if let Some((color, text)) = describe(&signal) {
                        println!("{}{}{}", color, text, colors::RESET);
                    }
                    match signal {
                        MachineSignal::NowShutdown => break,
                        // With no more input, exit once the model has settled
                        MachineSignal::Ready { ready: true } if !stdin_open => handle.shutdown_now()?,
                        _ => {}
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Missed {} machine signals", missed);
                }
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => match parse_command(&line) {
                    Ok(Some(command)) => session.dispatch(command).await?,
                    Ok(None) => {}
                    Err(message) => eprintln!("{}{}{}", colors::RED, message, colors::RESET),
                },
                None => {
                    stdin_open = false;
                    if call(&handle, ControlHandle::is_ready).await? {
                        handle.shutdown_now()?;
                    }
                }
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\n{}Interrupted, shutting down...{}", colors::YELLOW, colors::RESET);
                handle.shutdown_now()?;
            }
        }
    }

    tokio::task::spawn_blocking(move || thread.shutdown()).await??;
    Ok(())
}
