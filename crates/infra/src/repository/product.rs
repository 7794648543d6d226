use std::sync::Arc;

use cpm_core::{KeyType, ProductId, ProductTeamId};
use cpm_products::{CpmProduct, CpmProductEvent, CpmProductRecord, ProductKey};

use crate::keys::TableKey;
use crate::repository::{
    BatchedWriter, RepositoryError, Search, WriteResult, from_item, read_unique, row_data,
    write_aggregate,
};
use crate::store::{Item, KeyValueStore, PrimaryKey, Query, SortKeyCondition, TransactItem};
use crate::transaction::{create_transaction, delete_transaction, update_transactions};

fn root_key(product_team_id: &ProductTeamId, id: &ProductId) -> PrimaryKey {
    PrimaryKey::new(
        TableKey::ProductTeam.key([product_team_id.to_string()]),
        TableKey::Product.key([id.as_str()]),
    )
}

fn key_copy(key: &ProductKey) -> PrimaryKey {
    PrimaryKey::same(TableKey::ProductKey.key([key.key_type().as_str(), key.key_value()]))
}

fn decode(item: Item) -> Result<Option<CpmProduct>, RepositoryError> {
    from_item::<CpmProductRecord>(item).map(|record| Some(CpmProduct::from_record(record)))
}

/// CPM products, stored under their team's partition.
#[derive(Clone)]
pub struct CpmProductRepository {
    store: Arc<dyn KeyValueStore>,
    writer: BatchedWriter,
}

impl CpmProductRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            writer: BatchedWriter::new(store.clone()),
            store,
        }
    }

    pub fn with_writer(store: Arc<dyn KeyValueStore>, writer: BatchedWriter) -> Self {
        Self { store, writer }
    }

    pub fn transactions(event: &CpmProductEvent) -> Result<Vec<TransactItem>, RepositoryError> {
        match event {
            CpmProductEvent::Created(product) => {
                let root = root_key(&product.product_team_id, &product.id);
                let mut items = vec![create_transaction(root, row_data(product, true)?)];
                let copy = row_data(product, false)?;
                items.extend(
                    product
                        .keys
                        .iter()
                        .map(|key| create_transaction(key_copy(key), copy.clone())),
                );
                Ok(items)
            }
            CpmProductEvent::KeyAdded(event) => {
                let product = &event.product;
                let copy = row_data(product, false)?;
                let mut items = vec![create_transaction(key_copy(&event.new_key), copy.clone())];
                items.extend(update_transactions(
                    [root_key(&product.product_team_id, &product.id)],
                    &row_data(product, true)?,
                ));
                items.extend(update_transactions(
                    product
                        .keys
                        .iter()
                        .filter(|key| **key != event.new_key)
                        .map(key_copy),
                    &copy,
                ));
                Ok(items)
            }
            CpmProductEvent::Deleted(product) => {
                let mut items = update_transactions(
                    [root_key(&product.product_team_id, &product.id)],
                    &row_data(product, true)?,
                );
                items.extend(product.keys.iter().map(|key| delete_transaction(key_copy(key))));
                Ok(items)
            }
        }
    }

    pub fn write(&self, product: &mut CpmProduct) -> Result<Vec<WriteResult>, RepositoryError> {
        write_aggregate(&self.writer, product, Self::transactions)
    }

    pub fn read(
        &self,
        product_team_id: &ProductTeamId,
        id: &ProductId,
    ) -> Result<CpmProduct, RepositoryError> {
        let key = root_key(product_team_id, id);
        let item = read_unique(&self.store, &key.pk, SortKeyCondition::Equals(key.sk))?;
        Ok(CpmProduct::from_record(from_item(item)?))
    }

    pub fn read_by_key(&self, key: &ProductKey) -> Result<CpmProduct, RepositoryError> {
        let key = key_copy(key);
        let item = read_unique(&self.store, &key.pk, SortKeyCondition::Any)?;
        Ok(CpmProduct::from_record(from_item(item)?))
    }

    /// Every product of a team, deleted ones included.
    pub fn search(&self, product_team_id: &ProductTeamId) -> Search<CpmProduct> {
        let query = Query::new(
            TableKey::ProductTeam.key([product_team_id.to_string()]),
            SortKeyCondition::BeginsWith(TableKey::Product.filter_prefix()),
        );
        Search::query(self.store.clone(), query, decode)
    }
}
