use server_api::ApiContext;
use shared::protocol::ModelInfo;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) model: ModelInfo,
}

impl AppState {
    pub(crate) fn new(api: ApiContext) -> Self {
        let model = api.model_info();
        Self { api, model }
    }
}
