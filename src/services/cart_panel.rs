use crate::{
    dto::cart::{CartView, CartViewLine},
    models::{CartLine, CartState},
};

impl From<&CartLine> for CartViewLine {
    fn from(line: &CartLine) -> Self {
        Self {
            id: line.id.clone(),
            title: line.title.clone(),
            image: line.image.clone(),
            category: line.category.clone(),
            product_type: line.product_type,
            quantity: line.quantity,
            unit_price: line.price,
            line_total: line.line_total(),
            specifications: line.specifications.clone(),
        }
    }
}

impl From<&CartState> for CartView {
    fn from(state: &CartState) -> Self {
        Self {
            lines: state.items.iter().map(CartViewLine::from).collect(),
            item_count: state.item_count(),
            total: state.total,
            is_empty: state.is_empty(),
        }
    }
}
