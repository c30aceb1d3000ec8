pub mod feed_forward;
