//! Specifications API.

use serde_json::json;

use crate::client::StrataClient;
use crate::error::Result;
use crate::graphql::Results;
use crate::types::{
    DeletedEntity, Specification, SpecificationFilter, SpecificationInput,
    SpecificationUpdateInput,
};

const CREATE_SPECIFICATION: &str = concat!(
    "mutation CreateSpecification($specification: SpecificationInput!) ",
    "{ createSpecification(specification: $specification) { ",
    specification_fields!(),
    " } }"
);

const GET_SPECIFICATION: &str = concat!(
    "query GetSpecification($id: ID!) { specification(id: $id) { ",
    specification_fields!(),
    " } }"
);

const QUERY_SPECIFICATIONS: &str = concat!(
    "query QuerySpecifications($filter: SpecificationFilter) { specifications(filter: $filter) { results { ",
    specification_fields!(),
    " } } }"
);

const UPDATE_SPECIFICATION: &str = concat!(
    "mutation UpdateSpecification($specification: SpecificationUpdateInput!) ",
    "{ updateSpecification(specification: $specification) { ",
    specification_fields!(),
    " } }"
);

const DELETE_SPECIFICATION: &str =
    "mutation DeleteSpecification($id: ID!) { deleteSpecification(id: $id) { id state } }";

/// Specifications API client.
pub struct SpecificationsApi {
    client: StrataClient,
}

impl SpecificationsApi {
    pub(crate) fn new(client: StrataClient) -> Self {
        Self { client }
    }

    pub async fn create(&self, specification: SpecificationInput) -> Result<Specification> {
        self.client
            .field(
                "CreateSpecification",
                CREATE_SPECIFICATION,
                &json!({ "specification": specification }),
                "createSpecification",
            )
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Specification> {
        self.client
            .field(
                "GetSpecification",
                GET_SPECIFICATION,
                &json!({ "id": id }),
                "specification",
            )
            .await
    }

    pub async fn query(&self, filter: SpecificationFilter) -> Result<Vec<Specification>> {
        let results: Results<Specification> = self
            .client
            .field(
                "QuerySpecifications",
                QUERY_SPECIFICATIONS,
                &json!({ "filter": filter }),
                "specifications",
            )
            .await?;
        Ok(results.results)
    }

    pub async fn update(&self, specification: SpecificationUpdateInput) -> Result<Specification> {
        self.client
            .field(
                "UpdateSpecification",
                UPDATE_SPECIFICATION,
                &json!({ "specification": specification }),
                "updateSpecification",
            )
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<DeletedEntity> {
        self.client
            .field(
                "DeleteSpecification",
                DELETE_SPECIFICATION,
                &json!({ "id": id }),
                "deleteSpecification",
            )
            .await
    }
}
