use std::sync::Arc;

use cpm_core::{KeyType, ProductTeamId};
use cpm_products::{ProductTeam, ProductTeamEvent, ProductTeamKey, ProductTeamRecord};

use crate::keys::TableKey;
use crate::repository::{
    BatchedWriter, RepositoryError, Search, WriteResult, from_item, read_unique, row_data,
    write_aggregate,
};
use crate::store::{Item, KeyValueStore, PrimaryKey, Scan, SortKeyCondition, TransactItem};
use crate::transaction::{create_transaction, delete_transaction, update_transactions};

fn root_key(id: &ProductTeamId) -> PrimaryKey {
    PrimaryKey::same(TableKey::ProductTeam.key([id.to_string()]))
}

fn alias_key(key: &ProductTeamKey) -> PrimaryKey {
    PrimaryKey::same(
        TableKey::ProductTeamKey.key([key.key_type().as_str(), key.key_value()]),
    )
}

fn decode(item: Item) -> Result<Option<ProductTeam>, RepositoryError> {
    from_item::<ProductTeamRecord>(item).map(|record| Some(ProductTeam::from_record(record)))
}

/// Product teams: one root row plus one full copy per team key.
#[derive(Clone)]
pub struct ProductTeamRepository {
    store: Arc<dyn KeyValueStore>,
    writer: BatchedWriter,
}

impl ProductTeamRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            writer: BatchedWriter::new(store.clone()),
            store,
        }
    }

    pub fn with_writer(store: Arc<dyn KeyValueStore>, writer: BatchedWriter) -> Self {
        Self { store, writer }
    }

    /// Transaction items that persist one event.
    pub fn transactions(event: &ProductTeamEvent) -> Result<Vec<TransactItem>, RepositoryError> {
        match event {
            ProductTeamEvent::Created(team) => {
                let mut items = vec![create_transaction(root_key(&team.id), row_data(team, true)?)];
                let copy = row_data(team, false)?;
                items.extend(
                    team.keys
                        .iter()
                        .map(|key| create_transaction(alias_key(key), copy.clone())),
                );
                Ok(items)
            }
            ProductTeamEvent::Deleted(team) => {
                let mut items = update_transactions([root_key(&team.id)], &row_data(team, true)?);
                items.extend(team.keys.iter().map(|key| delete_transaction(alias_key(key))));
                Ok(items)
            }
        }
    }

    pub fn write(&self, team: &mut ProductTeam) -> Result<Vec<WriteResult>, RepositoryError> {
        write_aggregate(&self.writer, team, Self::transactions)
    }

    pub fn read(&self, id: &ProductTeamId) -> Result<ProductTeam, RepositoryError> {
        let key = root_key(id);
        let item = read_unique(&self.store, &key.pk, SortKeyCondition::Equals(key.sk))?;
        Ok(ProductTeam::from_record(from_item(item)?))
    }

    /// Read a team through one of its keys (aliases).
    pub fn read_by_key(&self, key: &ProductTeamKey) -> Result<ProductTeam, RepositoryError> {
        let key = alias_key(key);
        let item = read_unique(&self.store, &key.pk, SortKeyCondition::Any)?;
        Ok(ProductTeam::from_record(from_item(item)?))
    }

    /// Every team root row, lazily.
    pub fn search(&self) -> Search<ProductTeam> {
        let prefix = TableKey::ProductTeam.filter_prefix();
        Search::scan(
            self.store.clone(),
            Scan {
                pk_prefix: Some(prefix.clone()),
                sk_prefix: Some(prefix),
                ..Default::default()
            },
            decode,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use cpm_core::{AggregateRoot, Status};
    use cpm_products::ProductTeamKeyType;

    fn alias(value: &str) -> ProductTeamKey {
        ProductTeamKey::new(ProductTeamKeyType::ProductTeamIdAlias, value).unwrap()
    }

    fn setup() -> (Arc<InMemoryStore>, ProductTeamRepository) {
        let store = Arc::new(InMemoryStore::new());
        let repository = ProductTeamRepository::new(store.clone());
        (store, repository)
    }

    #[test]
    fn write_then_read_by_id_and_alias() {
        let (_, repository) = setup();
        let mut team =
            ProductTeam::create(ProductTeamId::new(), "Team", "AAA", vec![alias("a1")]).unwrap();
        repository.write(&mut team).unwrap();
        assert!(team.events().is_empty());

        let by_id = repository.read(team.id()).unwrap();
        assert_eq!(by_id, team);
        let by_alias = repository.read_by_key(&alias("a1")).unwrap();
        assert_eq!(by_alias, team);
    }

    #[test]
    fn read_missing_team_is_not_found() {
        let (_, repository) = setup();
        let err = repository.read(&ProductTeamId::new()).unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[test]
    fn duplicate_alias_is_a_conflict_and_leaves_first_team_intact() {
        let (store, repository) = setup();
        let mut first =
            ProductTeam::create(ProductTeamId::new(), "First", "AAA", vec![alias("shared")]).unwrap();
        repository.write(&mut first).unwrap();
        let rows_before = store.len();

        let mut second =
            ProductTeam::create(ProductTeamId::new(), "Second", "BBB", vec![alias("shared")]).unwrap();
        let err = repository.write(&mut second).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(second.events().len(), 1);

        assert_eq!(store.len(), rows_before);
        assert_eq!(repository.read_by_key(&alias("shared")).unwrap().name(), "First");
        assert!(repository.read(second.id()).unwrap_err().is_not_found());
    }

    #[test]
    fn delete_soft_deletes_root_and_releases_aliases() {
        let (_, repository) = setup();
        let mut team =
            ProductTeam::create(ProductTeamId::new(), "Team", "AAA", vec![alias("a1")]).unwrap();
        repository.write(&mut team).unwrap();

        team.delete().unwrap();
        repository.write(&mut team).unwrap();

        assert_eq!(repository.read(team.id()).unwrap().status(), Status::Inactive);
        assert!(repository.read_by_key(&alias("a1")).unwrap_err().is_not_found());

        let mut reuse =
            ProductTeam::create(ProductTeamId::new(), "Team 2", "AAA", vec![alias("a1")]).unwrap();
        repository.write(&mut reuse).unwrap();
    }

    #[test]
    fn search_with_no_teams_is_empty() {
        let (_, repository) = setup();
        assert_eq!(repository.search().count(), 0);
    }

    #[test]
    fn search_returns_only_team_roots() {
        let (_, repository) = setup();
        for name in ["One", "Two", "Three"] {
            let mut team =
                ProductTeam::create(ProductTeamId::new(), name, "AAA", vec![alias(name)]).unwrap();
            repository.write(&mut team).unwrap();
        }
        let teams: Vec<ProductTeam> = repository.search().collect::<Result<_, _>>().unwrap();
        assert_eq!(teams.len(), 3);
    }
}
