// Statistic processors
//
// Each processor implements one statistic over the user aggregate. They are
// registered on the pipeline in a fixed order; `play_count` and
// `hit_statistics` are the baseline accumulators the others follow.

pub use hit_statistics::HitStatisticsProcessor;
pub use play_count::PlayCountProcessor;
pub use play_time::PlayTimeProcessor;
pub use rank_count::RankCountProcessor;

mod hit_statistics;
mod play_count;
mod play_time;
mod rank_count;
