pub mod cache_stats;
