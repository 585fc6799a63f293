use insight_crossfilter::CrossfilterError;

pub type MdaResult<T> = Result<T, MdaError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MdaError {
    #[error(transparent)]
    Engine(#[from] CrossfilterError),

    #[error("widget {widget} is already borrowed")]
    WidgetBusy { widget: String },

    #[error("grouping is already borrowed")]
    GroupingBusy,

    #[error("dimension {dimension} is already borrowed")]
    DimensionBusy { dimension: String },

    #[error("dimension {dimension} already exists with one_to_many = {existing}")]
    DimensionKindMismatch { dimension: String, existing: bool },

    #[error("filter engine is already borrowed")]
    EngineBusy,

    #[error("selection queue still not empty after {limit} dispatch passes")]
    DispatchLimit { limit: usize },
}
