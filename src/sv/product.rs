use crate::{entity::product, prelude::*};

pub struct Product<'a, C> {
  db: &'a C,
}

impl<'a, C: ConnectionTrait> Product<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  pub async fn create(
    &self,
    name: String,
    description: Option<String>,
    price: i64,
  ) -> Result<product::Model> {
    if price <= 0 {
      let msg = format!("price must be positive, got {price}");
      return Err(Error::InvalidArgs(msg));
    }

    let product = product::ActiveModel {
      name: Set(name),
      description: Set(description),
      price: Set(price),
      is_active: Set(true),
      created_at: Set(Utc::now().naive_utc()),
      ..Default::default()
    };
    Ok(product.insert(self.db).await?)
  }

  pub async fn active(&self) -> Result<Vec<product::Model>> {
    let products = product::Entity::find()
      .filter(product::Column::IsActive.eq(true))
      .order_by_asc(product::Column::Price)
      .order_by_asc(product::Column::Id)
      .all(self.db)
      .await?;
    Ok(products)
  }

  pub async fn by_id(&self, id: i32) -> Result<Option<product::Model>> {
    Ok(product::Entity::find_by_id(id).one(self.db).await?)
  }

  pub async fn set_active(
    &self,
    id: i32,
    active: bool,
  ) -> Result<product::Model> {
    let product = self.by_id(id).await?.ok_or(Error::ProductNotFound)?;
    let product =
      product::ActiveModel { is_active: Set(active), ..product.into() }
        .update(self.db)
        .await?;
    Ok(product)
  }
}
