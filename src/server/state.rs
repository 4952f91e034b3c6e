use crate::coordinator::Coordinator;

#[derive(Clone)]
pub(crate) struct ServerState {
    pub(crate) coordinator: Coordinator,
}
