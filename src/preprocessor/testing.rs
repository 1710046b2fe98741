use crate::config::PreprocessorConfig;
use crate::datum::DataType;
use crate::expr::{table_scan, Expr, ExprRef};
use crate::metadata::{InMemoryMetadata, MetadataAccessor};
use crate::operator::{CmpType, ColumnFactory, Comparison, TableScan};
use crate::preprocessor::PreprocessContext;

/// Owns what a [`PreprocessContext`] borrows.
pub(crate) struct TestEnv {
    pub config: PreprocessorConfig,
    pub metadata: InMemoryMetadata,
    pub factory: ColumnFactory,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(PreprocessorConfig::new())
    }

    pub fn with_config(config: PreprocessorConfig) -> Self {
        Self {
            config,
            metadata: InMemoryMetadata::standard(),
            factory: ColumnFactory::new(),
        }
    }

    pub fn ctx(&self) -> PreprocessContext<'_> {
        PreprocessContext::new(&self.config, &self.metadata, &self.factory)
    }

    pub fn comparison(&self, cmp_type: CmpType) -> Comparison {
        self.metadata.comparison(cmp_type).unwrap()
    }

    pub fn cmp(&self, cmp_type: CmpType, left: ExprRef, right: ExprRef) -> ExprRef {
        Expr::cmp(self.comparison(cmp_type), left, right)
    }

    /// Integer table with `width` columns.
    pub fn table(&self, name: &str, width: usize, nullable: bool) -> TableScan {
        let columns = vec![(DataType::Int, nullable); width];
        table_scan(&self.factory, name, &columns)
    }
}
