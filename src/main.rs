use std::sync::Arc;

use presence_rooms::database::PostgresRoomStore;
use presence_rooms::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::load()?);
    init_tracing(&config)?;

    let store = Arc::new(PostgresRoomStore::connect(&config.database).await?);
    let registry = RoomRegistry::bootstrap(
        store.clone(),
        RoomEngineConfig {
            history_limit: config.presence.history_limit,
            message_max_len: config.presence.message_max_len,
            walk_speed: config.presence.walk_speed,
            command_channel_capacity: config.presence.command_channel_capacity,
        },
        config.presence.canonical_slug.clone(),
        config.presence.canonical_width,
        config.presence.canonical_height,
    )
    .await?;

    let state = AppState::new(config.clone(), store, registry);
    let app = presence_rooms::routes::router(state);

    Server::new((*config).clone()).serve(app).await
}
