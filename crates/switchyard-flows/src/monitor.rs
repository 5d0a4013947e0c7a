//! Ambient monitor: poll a feed on an interval, let the model judge each new
//! item, and raise an alert for the urgent ones. Runs until the feed is
//! exhausted or the run is cancelled.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use switchyard_core::config::{ExecutorConfig, MonitorConfig};
use switchyard_core::error::Result;
use switchyard_core::traits::{FeedSource, ModelClient};
use switchyard_core::types::{ChatMessage, FeedItem, FeedPoll};
use switchyard_graph::{
    ChannelSpec, CompileError, CompiledGraph, Node, NodeContext, RouteLabel, SleepOutcome, State,
    StateGraph, StateUpdate, END,
};

pub const LAST_CHECKED_ID: &str = "last_checked_id";
pub const LATEST_NEWS: &str = "latest_news";
pub const ANALYSIS: &str = "analysis";
pub const SHOULD_ALERT: &str = "should_alert";
pub const SHOULD_STOP: &str = "should_stop";
pub const ALERTS: &str = "alerts";

pub const CHECK_FEED: &str = "check_feed";
pub const ANALYZE_IMPORTANCE: &str = "analyze_importance";
pub const ALERT_USER: &str = "alert_user";

const TRIAGE_PROMPT: &str =
    "You are a personal executive assistant. Decide if a news item is URGENT enough to interrupt the boss. Return 'URGENT' or 'IGNORE'.";

pub struct MonitorDeps {
    pub model: Arc<dyn ModelClient>,
    pub feed: Arc<dyn FeedSource>,
    pub poll_interval: Duration,
}

pub fn channels() -> Vec<ChannelSpec> {
    vec![
        ChannelSpec::replace(LAST_CHECKED_ID, 0),
        ChannelSpec::replace(LATEST_NEWS, Value::Null),
        ChannelSpec::replace(ANALYSIS, Value::Null),
        ChannelSpec::replace(SHOULD_ALERT, false),
        ChannelSpec::replace(SHOULD_STOP, false),
        ChannelSpec::append(ALERTS),
    ]
}

pub fn input() -> StateUpdate {
    StateUpdate::new()
}

pub fn graph(deps: MonitorDeps) -> StateGraph {
    let mut g = StateGraph::new("ambient_monitor", channels());

    g.add_node(
        CHECK_FEED,
        CheckFeed {
            feed: deps.feed,
            poll_interval: deps.poll_interval,
        },
    );
    g.add_node(ANALYZE_IMPORTANCE, AnalyzeImportance { model: deps.model });
    g.add_node_fn(ALERT_USER, |state: State, _ctx: NodeContext| async move {
        let content = state
            .get_as::<FeedItem>(LATEST_NEWS)
            .map(|item| item.content)
            .unwrap_or_default();
        warn!(news = %content, "INTERRUPT: Boss, I found something you need to see");
        Ok(StateUpdate::new().set(ALERTS, json!([content])))
    });

    g.set_entry_point(CHECK_FEED)
        .add_conditional_edges(
            CHECK_FEED,
            route_feed_check,
            [
                (ANALYZE_IMPORTANCE, ANALYZE_IMPORTANCE),
                (CHECK_FEED, CHECK_FEED),
                (END, END),
            ],
        )
        .add_conditional_edges(
            ANALYZE_IMPORTANCE,
            route_after_analysis,
            [(ALERT_USER, ALERT_USER), (CHECK_FEED, CHECK_FEED)],
        )
        .add_edge(ALERT_USER, CHECK_FEED);
    g
}

/// In continuous mode the monitor loops until cancelled, so the step budget
/// is lifted for it.
pub fn build(
    deps: MonitorDeps,
    monitor: &MonitorConfig,
    executor: &ExecutorConfig,
) -> std::result::Result<CompiledGraph, CompileError> {
    let mut executor = executor.clone();
    if !monitor.demo_mode {
        executor.step_budget = usize::MAX;
    }
    graph(deps).with_config(executor).compile()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedRoute {
    Stop,
    Idle,
    Analyze,
}

impl RouteLabel for FeedRoute {
    fn label(&self) -> &str {
        match self {
            Self::Stop => END,
            Self::Idle => CHECK_FEED,
            Self::Analyze => ANALYZE_IMPORTANCE,
        }
    }

    fn declared() -> Option<Vec<&'static str>> {
        Some(vec![END, CHECK_FEED, ANALYZE_IMPORTANCE])
    }
}

/// Stop when asked to; analyze only items newer than the last one analyzed.
pub fn route_feed_check(state: &State) -> FeedRoute {
    if state.get_bool(SHOULD_STOP) {
        info!("Agent stopping");
        return FeedRoute::Stop;
    }
    let last_checked = state.get_u64(LAST_CHECKED_ID).unwrap_or(0);
    match state.get_as::<FeedItem>(LATEST_NEWS) {
        Some(item) if item.id != last_checked => FeedRoute::Analyze,
        _ => FeedRoute::Idle,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisRoute {
    Alert,
    Ignore,
}

impl RouteLabel for AnalysisRoute {
    fn label(&self) -> &str {
        match self {
            Self::Alert => ALERT_USER,
            Self::Ignore => CHECK_FEED,
        }
    }

    fn declared() -> Option<Vec<&'static str>> {
        Some(vec![ALERT_USER, CHECK_FEED])
    }
}

pub fn route_after_analysis(state: &State) -> AnalysisRoute {
    if state.get_bool(SHOULD_ALERT) {
        AnalysisRoute::Alert
    } else {
        AnalysisRoute::Ignore
    }
}

struct CheckFeed {
    feed: Arc<dyn FeedSource>,
    poll_interval: Duration,
}

impl Node for CheckFeed {
    fn run(&self, _state: State, ctx: NodeContext) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            let stop = StateUpdate::new().set(SHOULD_STOP, true);
            if ctx.is_cancel_requested() {
                info!("Shutdown requested, stopping");
                return Ok(stop);
            }

            debug!(
                step = ctx.step(),
                poll_interval_ms = self.poll_interval.as_millis() as u64,
                "Waking up to check feed"
            );
            if ctx.sleep(self.poll_interval).await == SleepOutcome::Cancelled {
                return Ok(stop);
            }

            match self.feed.poll().await? {
                FeedPoll::Item(item) => {
                    info!(id = item.id, content = %item.content, "Found item");
                    let news = serde_json::to_value(&item)?;
                    Ok(StateUpdate::new().set(LATEST_NEWS, news))
                }
                FeedPoll::Empty => {
                    debug!("No new data");
                    Ok(StateUpdate::new())
                }
                FeedPoll::Exhausted => {
                    info!("Feed exhausted");
                    Ok(stop)
                }
            }
        })
    }
}

struct AnalyzeImportance {
    model: Arc<dyn ModelClient>,
}

impl Node for AnalyzeImportance {
    fn run(&self, state: State, _ctx: NodeContext) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            let Some(item) = state.get_as::<FeedItem>(LATEST_NEWS) else {
                return Ok(StateUpdate::new().set(SHOULD_ALERT, false));
            };
            let update = StateUpdate::new().set(LAST_CHECKED_ID, item.id);

            let reply = self
                .model
                .invoke(vec![
                    ChatMessage::system(TRIAGE_PROMPT),
                    ChatMessage::user(format!("News: {}", item.content)),
                ])
                .await;

            Ok(match reply {
                Ok(text) => {
                    let urgent = text.contains("URGENT");
                    info!(id = item.id, urgent, "Analyzed importance");
                    update.set(SHOULD_ALERT, urgent).set(ANALYSIS, text)
                }
                Err(e) => {
                    warn!(id = item.id, error = %e, "Analysis failed, not alerting");
                    update
                        .set(SHOULD_ALERT, false)
                        .set(ANALYSIS, format!("Error: {e}"))
                }
            })
        })
    }
}

const MOCK_NEWS: [(&str, bool); 8] = [
    ("Bitcoin is stable at $60k", false),
    ("New cat video trending on YouTube", false),
    ("CRITICAL: Market crash! Bitcoin drops to $20k!", true),
    ("Just kidding, it was a glitch.", false),
    ("Ethereum upgrade completed successfully", false),
    ("BREAKING: Major exchange hacked, funds at risk!", true),
    ("New meme coin launches, up 1000%", false),
    ("Fed announces interest rate decision", false),
];

/// Canned market news. One pass in demo mode; cycles forever otherwise.
///
/// Item ids are the tick number, so they keep increasing across cycles.
pub struct MockNewsFeed {
    tick: Mutex<u64>,
    cycle: bool,
}

impl MockNewsFeed {
    pub fn new(demo_mode: bool) -> Self {
        Self {
            tick: Mutex::new(0),
            cycle: !demo_mode,
        }
    }

    pub fn len() -> usize {
        MOCK_NEWS.len()
    }
}

impl FeedSource for MockNewsFeed {
    fn poll(&self) -> BoxFuture<'_, Result<FeedPoll>> {
        Box::pin(async move {
            let mut tick = self.tick.lock().await;
            let len = MOCK_NEWS.len() as u64;
            if !self.cycle && *tick >= len {
                return Ok(FeedPoll::Exhausted);
            }
            let (content, urgent) = MOCK_NEWS[(*tick % len) as usize];
            *tick += 1;
            Ok(FeedPoll::Item(FeedItem {
                id: *tick,
                content: content.to_string(),
                urgent,
            }))
        })
    }
}
