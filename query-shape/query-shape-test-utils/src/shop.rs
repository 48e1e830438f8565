//! A small shop catalog used across planner tests.
//!
//! ```text
//! Order       Id*, Total, OrderKey1, OrderKey2, Customer -> Customer, Lines ->> OrderLine
//! Customer    Id*, Name, Orders ->> Order
//! OrderLine   Id*, Quantity, Product -> Product
//! Product     Id*, Name, Photo (stream)
//! Party       abstract, open: Id*, Name, Version#
//!   Person    Code: Int32, Employer -> Party
//!   Company   Code: String, Subsidiaries ->> Company, Rating#
//!     Agency  License
//! Document    has stream: Id*, Title
//! ```
//!
//! `*` marks keys, `#` etag fields.

use query_shape_model::{
    PropId, TypeId,
    types::{PrimitiveKind, PropFlags, PropertyKind, TypeFlags, TypeTable},
};

pub struct Shop {
    pub table: TypeTable,

    pub order: TypeId,
    pub customer: TypeId,
    pub order_line: TypeId,
    pub product: TypeId,
    pub party: TypeId,
    pub person: TypeId,
    pub company: TypeId,
    pub agency: TypeId,
    pub document: TypeId,

    pub order_id: PropId,
    pub order_total: PropId,
    pub order_key1: PropId,
    pub order_key2: PropId,
    pub order_customer: PropId,
    pub order_lines: PropId,
    pub customer_id: PropId,
    pub customer_name: PropId,
    pub customer_orders: PropId,
    pub line_quantity: PropId,
    pub product_photo: PropId,
    pub party_id: PropId,
    pub party_name: PropId,
    pub party_version: PropId,
    pub person_code: PropId,
    pub person_employer: PropId,
    pub company_code: PropId,
    pub company_subsidiaries: PropId,
    pub company_rating: PropId,
    pub agency_license: PropId,
}

pub const ORDERS: &str = "Orders";
pub const CUSTOMERS: &str = "Customers";
pub const PRODUCTS: &str = "Products";
pub const PARTIES: &str = "Parties";
pub const DOCUMENTS: &str = "Documents";

impl Shop {
    pub fn new() -> Self {
        let mut builder = TypeTable::builder();
        let int32 = builder.primitive(PrimitiveKind::Int32);
        let int64 = builder.primitive(PrimitiveKind::Int64);
        let string = builder.primitive(PrimitiveKind::String);
        let decimal = builder.primitive(PrimitiveKind::Decimal);
        let stream = builder.primitive(PrimitiveKind::Stream);

        let order = builder.add_entity("Shop.Order", None);
        let customer = builder.add_entity("Shop.Customer", None);
        let order_line = builder.add_entity("Shop.OrderLine", None);
        let product = builder.add_entity("Shop.Product", None);
        let party = builder.add_entity("Shop.Party", None);
        let person = builder.add_entity("Shop.Person", Some(party));
        let company = builder.add_entity("Shop.Company", Some(party));
        let agency = builder.add_entity("Shop.Agency", Some(company));
        let document = builder.add_entity("Shop.Document", None);

        builder.set_flags(party, TypeFlags::ABSTRACT | TypeFlags::OPEN);
        builder.set_flags(document, TypeFlags::HAS_STREAM);

        let orders = builder.add_entity_collection(order);
        let order_lines = builder.add_entity_collection(order_line);
        let companies = builder.add_entity_collection(company);

        use PropertyKind::*;
        let none = PropFlags::empty();

        let order_id = builder.add_property(order, "Id", Primitive, int32, PropFlags::KEY);
        let order_total = builder.add_property(order, "Total", Primitive, decimal, none);
        let order_key1 = builder.add_property(order, "OrderKey1", Primitive, int32, none);
        let order_key2 = builder.add_property(order, "OrderKey2", Primitive, string, none);
        let order_customer =
            builder.add_property(order, "Customer", ResourceReference, customer, none);
        let order_lines =
            builder.add_property(order, "Lines", ResourceSetReference, order_lines, none);

        let customer_id = builder.add_property(customer, "Id", Primitive, int32, PropFlags::KEY);
        let customer_name = builder.add_property(customer, "Name", Primitive, string, none);
        let customer_orders =
            builder.add_property(customer, "Orders", ResourceSetReference, orders, none);

        builder.add_property(order_line, "Id", Primitive, int32, PropFlags::KEY);
        let line_quantity = builder.add_property(order_line, "Quantity", Primitive, int32, none);
        builder.add_property(order_line, "Product", ResourceReference, product, none);

        builder.add_property(product, "Id", Primitive, int32, PropFlags::KEY);
        builder.add_property(product, "Name", Primitive, string, none);
        let product_photo = builder.add_property(product, "Photo", Stream, stream, none);

        let party_id = builder.add_property(party, "Id", Primitive, int32, PropFlags::KEY);
        let party_name = builder.add_property(party, "Name", Primitive, string, none);
        let party_version =
            builder.add_property(party, "Version", Primitive, int64, PropFlags::ETAG);
        let person_code = builder.add_property(person, "Code", Primitive, int32, none);
        let person_employer =
            builder.add_property(person, "Employer", ResourceReference, party, none);
        let company_code = builder.add_property(company, "Code", Primitive, string, none);
        let company_subsidiaries =
            builder.add_property(company, "Subsidiaries", ResourceSetReference, companies, none);
        let company_rating =
            builder.add_property(company, "Rating", Primitive, int32, PropFlags::ETAG);
        let agency_license = builder.add_property(agency, "License", Primitive, string, none);

        builder.add_property(document, "Id", Primitive, int32, PropFlags::KEY);
        builder.add_property(document, "Title", Primitive, string, none);

        Self {
            table: builder.build(),
            order,
            customer,
            order_line,
            product,
            party,
            person,
            company,
            agency,
            document,
            order_id,
            order_total,
            order_key1,
            order_key2,
            order_customer,
            order_lines,
            customer_id,
            customer_name,
            customer_orders,
            line_quantity,
            product_photo,
            party_id,
            party_name,
            party_version,
            person_code,
            person_employer,
            company_code,
            company_subsidiaries,
            company_rating,
            agency_license,
        }
    }
}

impl Default for Shop {
    fn default() -> Self {
        Self::new()
    }
}
