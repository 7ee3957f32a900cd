mod components;
mod events;
mod executor;
mod grid;
mod level;
mod motion;
mod phase;
mod physics;
mod player;
mod queue;
mod raycast;
mod search;
mod solver;
mod strategic;
mod tools;

use bevy::prelude::*;

use components::{GameConfig, HeadlessMode};
use grid::Heading;
use level::Level;
use solver::{SolverConfig, StartBot};
use tools::ToolKind;

#[derive(serde::Deserialize, Default)]
struct StartupConfig {
    level: Option<String>,
    game: Option<GameConfig>,
    solver: Option<SolverConfig>,
}

fn load_startup_config() -> StartupConfig {
    let path = std::env::var("CUBOT_CONFIG")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "game.json".to_string());
    match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<StartupConfig>(&contents) {
            Ok(cfg) => {
                println!("[Cubot] Loaded startup config from {}", path);
                cfg
            }
            Err(e) => {
                eprintln!("[Cubot] Failed to parse {}: {}", path, e);
                StartupConfig::default()
            }
        },
        Err(_) => StartupConfig::default(),
    }
}

fn pick_level(name: Option<&str>) -> Level {
    match name {
        Some("corridor") => Level::corridor(8),
        Some("bend") => Level::bend(3, Heading::South, Some(ToolKind::Rotatable)),
        _ => Level::test_level(),
    }
}

/// Fire one `StartBot` on the first fixed tick when `--bot` was passed.
#[derive(Resource)]
struct AutoStartBot(bool);

fn auto_start_bot(mut flag: ResMut<AutoStartBot>, mut start: EventWriter<StartBot>) {
    if flag.0 {
        flag.0 = false;
        start.send(StartBot);
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let headless = args.iter().any(|a| a == "--headless");
    let auto_bot = args.iter().any(|a| a == "--bot");
    let startup_config = load_startup_config();

    let mut app = App::new();
    app.insert_resource(HeadlessMode(headless));

    if headless {
        // Headless mode: no window, no rendering, just the fixed-tick ECS.
        app.add_plugins(MinimalPlugins);
        app.add_plugins(bevy::state::app::StatesPlugin);
        println!("[Cubot] Starting in HEADLESS mode");
    } else {
        app.add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Cubot".to_string(),
                ..default()
            }),
            ..default()
        }));
        println!("[Cubot] Starting in WINDOWED mode");
    }

    app.insert_resource(pick_level(startup_config.level.as_deref()))
        .insert_resource(startup_config.game.unwrap_or_default())
        .insert_resource(startup_config.solver.unwrap_or_default())
        .insert_resource(AutoStartBot(auto_bot))
        .insert_resource(Time::<Fixed>::from_hz(60.0))
        .add_plugins(events::GameEventsPlugin)
        .add_plugins(phase::PhasePlugin)
        .add_plugins(player::PlayerPlugin)
        .add_plugins(solver::SolverPlugin)
        .add_plugins(executor::ExecutorPlugin)
        .add_plugins(physics::PhysicsPlugin)
        .add_systems(FixedUpdate, auto_start_bot.before(solver::begin_solve));

    app.run();
}
