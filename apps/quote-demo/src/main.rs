use std::error::Error;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use backlash_core::{use_backlash_with_seed, Command, DispatchTable, Snapshot, UpdateMap};
use backlash_runtime_std::{
    ComponentHost, HostError, HostOptions, Spawner, StdRuntime, VirtualClock,
};

const LATENCY_MILLIS: u64 = 250;

const QUOTES: [&str; 2] = [
    "Simple things should be simple, complex things should be possible.",
    "Make it work, make it right, make it fast.",
];

#[derive(Debug, Clone, PartialEq)]
enum Status {
    Idle,
    Loading,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Quotes {
    status: Status,
    quotes: Vec<String>,
}

impl Default for Quotes {
    fn default() -> Self {
        Self {
            status: Status::Idle,
            quotes: Vec::new(),
        }
    }
}

impl fmt::Display for Quotes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            Status::Idle => writeln!(f, "[idle]")?,
            Status::Loading => writeln!(f, "[loading]")?,
            Status::Failed(error) => writeln!(f, "[error] {error}")?,
        }
        for (index, quote) in self.quotes.iter().enumerate() {
            writeln!(f, "  {}. {quote}", index + 1)?;
        }
        Ok(())
    }
}

/// Pretend remote quote service driven by the virtual clock.
#[derive(Clone)]
struct QuoteService {
    spawner: Spawner,
    clock: VirtualClock,
    latency_millis: u64,
}

impl QuoteService {
    /// Resolves after the configured latency. Attempts past the end of the
    /// catalogue fail the way a malformed response would.
    fn fetch_quote(&self, attempt: usize) -> impl Future<Output = Result<String, String>> {
        let sleep = self.clock.sleep(self.latency_millis);
        async move {
            sleep.await;
            QUOTES
                .get(attempt)
                .map(|quote| quote.to_string())
                .ok_or_else(|| String::from("invalid quote format!"))
        }
    }
}

fn init(request_on_init: bool) -> Command<Quotes, QuoteService> {
    let command = Command::new(Quotes::default());
    if request_on_init {
        command.effect(|actions, _| actions.dispatch("request_quote", ()))
    } else {
        command
    }
}

fn quote_update() -> UpdateMap<Quotes, QuoteService> {
    UpdateMap::<Quotes, QuoteService>::new()
        .on("request_quote", |state: &Rc<Quotes>, (): ()| {
            let attempt = state.quotes.len();
            let loading = Quotes {
                status: Status::Loading,
                quotes: state.quotes.clone(),
            };
            Command::new(loading).effect(move |actions, service: &Snapshot<QuoteService>| {
                let actions = actions.clone();
                let reply = service.fetch_quote(attempt);
                let spawned = service.spawner.spawn(async move {
                    match reply.await {
                        Ok(quote) => actions.dispatch("success", quote),
                        Err(error) => actions.dispatch("failure", error),
                    }
                });
                if spawned.is_none() {
                    log::warn!("executor is gone; quote request dropped");
                }
            })
        })
        .on("success", |state: &Rc<Quotes>, quote: String| {
            let mut quotes = state.quotes.clone();
            quotes.push(quote);
            Command::new(Quotes {
                status: Status::Idle,
                quotes,
            })
        })
        .on("failure", |state: &Rc<Quotes>, error: String| {
            Command::new(Quotes {
                status: Status::Failed(error),
                quotes: state.quotes.clone(),
            })
        })
        .on("clear", |state: &Rc<Quotes>, (): ()| {
            if state.quotes.is_empty() {
                Command::unchanged(state)
            } else {
                Command::new(Quotes {
                    status: state.status.clone(),
                    quotes: Vec::new(),
                })
            }
        })
}

type QuoteView = (Rc<Quotes>, DispatchTable<Quotes, QuoteService>);

/// Alternates executor turns, renders and clock jumps until nothing is left.
fn settle(runtime: &StdRuntime, host: &mut ComponentHost<QuoteView>) -> Result<(), HostError> {
    loop {
        let ran = runtime.run_until_stalled();
        if host.needs_render() {
            host.flush()?;
            continue;
        }
        if ran > 0 {
            continue;
        }
        if !runtime.clock().advance_to_next() {
            return Ok(());
        }
        log::debug!("clock advanced to {}ms", runtime.clock().now_millis());
    }
}

fn print_state(runtime: &StdRuntime, host: &ComponentHost<QuoteView>) {
    if let Some((state, _)) = host.output() {
        println!("@{}ms after {} render(s)", runtime.clock().now_millis(), host.renders());
        print!("{state}");
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let options = HostOptions::from_env();
    log::info!(
        "starting quote demo (strict={}, max render passes={})",
        options.is_strict(),
        options.render_pass_limit()
    );

    let runtime = StdRuntime::new();
    let service = QuoteService {
        spawner: runtime.spawner(),
        clock: runtime.clock(),
        latency_millis: LATENCY_MILLIS,
    };
    let update = quote_update();
    let mut host = runtime.host(options, move |cx| {
        use_backlash_with_seed(cx, true, init, &update, service.clone())
    });

    let actions = host.mount()?.1.clone();
    print_state(&runtime, &host);
    settle(&runtime, &mut host)?;
    print_state(&runtime, &host);

    for tag in ["request_quote", "request_quote", "clear", "clear"] {
        log::info!("dispatching `{tag}`");
        actions.try_dispatch(tag, ())?;
        settle(&runtime, &mut host)?;
        print_state(&runtime, &host);
    }

    host.unmount()?;
    actions.try_dispatch("request_quote", ())?;
    log::info!("dispatch after unmount ignored; {} render(s) total", host.renders());
    Ok(())
}
