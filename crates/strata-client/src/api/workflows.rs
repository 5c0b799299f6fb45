//! Workflows API.

use serde_json::json;

use crate::client::StrataClient;
use crate::error::Result;
use crate::graphql::Results;
use crate::types::{DeletedEntity, Workflow, WorkflowFilter, WorkflowInput, WorkflowUpdateInput};

const CREATE_WORKFLOW: &str = concat!(
    "mutation CreateWorkflow($workflow: WorkflowInput!) { createWorkflow(workflow: $workflow) { ",
    workflow_fields!(),
    " } }"
);

const GET_WORKFLOW: &str = concat!(
    "query GetWorkflow($id: ID!) { workflow(id: $id) { ",
    workflow_fields!(),
    " } }"
);

const QUERY_WORKFLOWS: &str = concat!(
    "query QueryWorkflows($filter: WorkflowFilter) { workflows(filter: $filter) { results { ",
    workflow_fields!(),
    " } } }"
);

const UPDATE_WORKFLOW: &str = concat!(
    "mutation UpdateWorkflow($workflow: WorkflowUpdateInput!) { updateWorkflow(workflow: $workflow) { ",
    workflow_fields!(),
    " } }"
);

const DELETE_WORKFLOW: &str =
    "mutation DeleteWorkflow($id: ID!) { deleteWorkflow(id: $id) { id state } }";

/// Workflows API client.
pub struct WorkflowsApi {
    client: StrataClient,
}

impl WorkflowsApi {
    pub(crate) fn new(client: StrataClient) -> Self {
        Self { client }
    }

    pub async fn create(&self, workflow: WorkflowInput) -> Result<Workflow> {
        self.client
            .field(
                "CreateWorkflow",
                CREATE_WORKFLOW,
                &json!({ "workflow": workflow }),
                "createWorkflow",
            )
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Workflow> {
        self.client
            .field("GetWorkflow", GET_WORKFLOW, &json!({ "id": id }), "workflow")
            .await
    }

    pub async fn query(&self, filter: WorkflowFilter) -> Result<Vec<Workflow>> {
        let results: Results<Workflow> = self
            .client
            .field(
                "QueryWorkflows",
                QUERY_WORKFLOWS,
                &json!({ "filter": filter }),
                "workflows",
            )
            .await?;
        Ok(results.results)
    }

    pub async fn update(&self, workflow: WorkflowUpdateInput) -> Result<Workflow> {
        self.client
            .field(
                "UpdateWorkflow",
                UPDATE_WORKFLOW,
                &json!({ "workflow": workflow }),
                "updateWorkflow",
            )
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<DeletedEntity> {
        self.client
            .field(
                "DeleteWorkflow",
                DELETE_WORKFLOW,
                &json!({ "id": id }),
                "deleteWorkflow",
            )
            .await
    }
}
