pub mod game_logic;
pub mod movement;
pub mod networking;
pub mod networking_plugin;
pub mod prediction;
