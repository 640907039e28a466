//! Many-to-many relations.
//!
//! A many-to-many attribute stores each edge as one join resource holding a pointer
//! to the owner and a pointer to the related resource. Both pointers live under the
//! lower-cased class names, so a `Customer` related to `Address` through
//! `CustomerAddresss` has join rows shaped like
//! `{"customer": <Pointer>, "address": <Pointer>}`.

use std::sync::Arc;
use tracing::debug;

use crate::{
    batch::Batcher,
    client::Client,
    error::{DocumentError, DocumentResult},
    field::ManyToMany,
    object::Object,
    query::Queryset,
    schema::Schema,
    value::Value,
};

/// The relation of one owner instance, read and changed through its join rows.
#[derive(Debug, Clone)]
pub struct ManyToManyManager<'a> {
    client: &'a Client,
    owner: &'a Object,
    related: Arc<Schema>,
    join: Arc<Schema>,
    owner_key: String,
    related_key: String,
}

impl<'a> ManyToManyManager<'a> {
    pub fn new(client: &'a Client, owner: &'a Object, relation: &ManyToMany) -> DocumentResult<Self> {
        let related = client.registry().resolve(relation.related())?;
        let join = client
            .registry()
            .resolve(&relation.join_class(owner.class_name()))?;

        Ok(Self {
            client,
            owner,
            owner_key: owner.class_name().to_lowercase(),
            related_key: related.class_name().to_lowercase(),
            related,
            join,
        })
    }

    pub fn related_schema(&self) -> &Arc<Schema> {
        &self.related
    }

    pub fn join_schema(&self) -> &Arc<Schema> {
        &self.join
    }

    /// Join rows of this owner, with their pointers unresolved.
    fn owner_rows(&self) -> DocumentResult<Queryset<'a>> {
        Queryset::new(self.client, self.join.clone())
            .shallow()
            .filter(&self.owner_key, Value::from(self.owner.as_pointer()?))
    }

    /// A queryset over the related resources of this owner.
    ///
    /// Reads the owner's join rows once; the returned queryset then matches the
    /// related ids they hold.
    pub async fn all(&self) -> DocumentResult<Queryset<'a>> {
        let rows = self.owner_rows()?.fetch().await?;
        let ids = rows
            .iter()
            .filter_map(|row| row.get(&self.related_key).and_then(Value::referenced_id))
            .map(Value::from)
            .collect::<Vec<_>>();

        debug!(join = %self.join.class_name(), related = ids.len(), "resolved relation");
        Queryset::new(self.client, self.related.clone()).filter("objectId__in", ids)
    }

    /// Relates every given resource to the owner, saving one join row each in a
    /// single batch. Adding nothing does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::UnsavedReference`] if the owner or any related
    /// resource has not been saved.
    pub async fn add<'r>(&self, related: impl IntoIterator<Item = &'r Object>) -> DocumentResult<()> {
        let owner = Value::from(self.owner.as_pointer()?);

        let mut rows = related
            .into_iter()
            .map(|item| {
                Object::with_attrs(
                    self.join.clone(),
                    [
                        (self.owner_key.clone(), owner.clone()),
                        (self.related_key.clone(), Value::from(item.as_pointer()?)),
                    ],
                )
            })
            .collect::<DocumentResult<Vec<_>>>()?;

        if rows.is_empty() {
            return Ok(());
        }

        Batcher::new(self.client).batch_save(&mut rows).await
    }

    /// Replaces the related resources of the owner.
    pub async fn set<'r>(&self, related: impl IntoIterator<Item = &'r Object>) -> DocumentResult<()> {
        self.clear().await?;
        self.add(related).await
    }

    /// Removes every join row of this owner.
    pub async fn clear(&self) -> DocumentResult<()> {
        let mut rows = self.owner_rows()?.fetch().await?;

        match Batcher::new(self.client).batch_delete(&mut rows).await {
            Err(DocumentError::EmptyBatch) => Ok(()),
            other => other,
        }
    }

    /// Removes every join row of the join class, whichever owner it belongs to.
    pub async fn clear_all(&self) -> DocumentResult<()> {
        Queryset::new(self.client, self.join.clone()).delete().await
    }
}

impl Object {
    /// The manager of a many-to-many attribute of this instance.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Configuration`] if `name` is not a many-to-many
    /// attribute of the schema.
    pub fn related<'a>(&'a self, client: &'a Client, name: &str) -> DocumentResult<ManyToManyManager<'a>> {
        let relation = self.schema().relation(name).ok_or_else(|| {
            DocumentError::Configuration(format!(
                "{} has no many-to-many attribute {name}",
                self.class_name()
            ))
        })?;

        ManyToManyManager::new(client, self, relation)
    }

    /// Replaces the resources related through `name`.
    pub async fn set_related<'r>(
        &self,
        client: &Client,
        name: &str,
        related: impl IntoIterator<Item = &'r Object>,
    ) -> DocumentResult<()> {
        self.related(client, name)?.set(related).await
    }
}
