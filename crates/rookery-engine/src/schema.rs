use std::sync::Arc;

use async_graphql_parser::types::OperationType;
use rookery_storage::Store;

use crate::{
    executor::ResolverEnv,
    parse::parse_operation,
    request::Request,
    resolvers,
    response::{Response, ServerError},
    validation::{check_operation_limits, OperationLimits},
};

/// The executable schema: the storage collaborator plus the operation
/// limits enforced before resolution.
pub struct Schema {
    store: Arc<dyn Store>,
    limits: OperationLimits,
}

impl Schema {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            limits: OperationLimits::default(),
        }
    }

    #[must_use]
    pub fn with_operation_limits(mut self, limits: OperationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Executes one request.
    ///
    /// Parsing and limit validation run before anything touches storage; a
    /// rejected document produces an error response with no data and no
    /// storage calls. Resolution happens inside a fresh request-scoped
    /// environment that is dropped — loaders, caches and all — when this
    /// method returns, on success and on early failure alike.
    pub async fn execute(&self, request: Request) -> Response {
        let operation = match parse_operation(&request.query, request.operation_name.as_deref()) {
            Ok(operation) => operation,
            Err(error) => return Response::from_errors(vec![error.into()]),
        };

        if let Err(error) =
            check_operation_limits(&operation.definition.selection_set, &operation.fragments, self.limits)
        {
            return Response::from_errors(vec![error]);
        }

        let env = ResolverEnv::new(Arc::clone(&self.store), &operation.fragments, &request.variables);
        tracing::debug!(operation = ?operation.definition.ty, "executing");

        let data = match operation.definition.ty {
            OperationType::Query => resolvers::resolve_query(&env, &operation.definition.selection_set).await,
            OperationType::Mutation => resolvers::resolve_mutation(&env, &operation.definition.selection_set).await,
            OperationType::Subscription => {
                return Response::from_errors(vec![ServerError::new("Subscriptions are not supported.", None)])
            }
        };

        Response::new(data, env.take_errors())
    }
}
