pub mod order;
pub mod order_item;
pub mod product;
pub mod product_batch;

pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use product::Entity as Product;
pub use product_batch::Entity as ProductBatch;
