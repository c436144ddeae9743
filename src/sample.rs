//! Northwind sample model.
//!
//! A small slice of the classic Northwind schema: orders with their customer
//! and employee, plus same-shaped DTO types for adapted repositories. Used
//! by the CLI and throughout the tests.

use std::sync::Arc;

use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use serde::{Deserialize, Serialize};

use crate::config::DatabaseConfig;
use crate::data_source::{DataSource, MemoryDataSource, SeaOrmDataSource};
use crate::entity;
use crate::errors::{AppResult, DataSourceResult, ExpressionResult};
use crate::expression::{Predicate, TypeMapping};
use crate::model::{Entity, MemberKind, TypeId, TypeRegistry};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Order {
    pub order_id: i64,
    pub ship_country: String,
    pub ship_region: Option<String>,
    pub freight: f64,
    pub customer_id: String,
    pub employee_id: i64,
    pub customer: Option<Customer>,
    pub employee: Option<Employee>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Customer {
    pub customer_id: String,
    pub company_name: String,
    pub contact_name: String,
    pub country: String,
    pub customer_demographics: Option<Vec<CustomerDemographic>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomerDemographic {
    pub customer_type_id: String,
    pub customer_desc: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Employee {
    pub employee_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub country: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderDto {
    pub order_id: i64,
    pub ship_country: String,
    pub ship_region: Option<String>,
    pub freight: f64,
    pub customer_id: String,
    pub employee_id: i64,
    pub customer: Option<CustomerDto>,
    pub employee: Option<EmployeeDto>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomerDto {
    pub customer_id: String,
    pub company_name: String,
    pub contact_name: String,
    pub country: String,
    pub customer_demographics: Option<Vec<CustomerDemographic>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmployeeDto {
    pub employee_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub country: String,
}

entity! {
    Order {
        name: "Order",
        table: "orders",
        keys: ["OrderId"],
        members: [
            "OrderId" => MemberKind::Scalar,
            "ShipCountry" => MemberKind::Scalar,
            "ShipRegion" => MemberKind::Scalar,
            "Freight" => MemberKind::Scalar,
            "CustomerId" => MemberKind::Scalar,
            "EmployeeId" => MemberKind::Scalar,
            "Customer" => MemberKind::reference("Customer"),
            "Employee" => MemberKind::reference("Employee"),
        ]
    }
}

entity! {
    Customer {
        name: "Customer",
        table: "customers",
        keys: ["CustomerId"],
        members: [
            "CustomerId" => MemberKind::Scalar,
            "CompanyName" => MemberKind::Scalar,
            "ContactName" => MemberKind::Scalar,
            "Country" => MemberKind::Scalar,
            "CustomerDemographics" => MemberKind::collection("CustomerDemographic"),
        ]
    }
}

entity! {
    CustomerDemographic {
        name: "CustomerDemographic",
        table: "customer_demographics",
        keys: ["CustomerTypeId"],
        members: [
            "CustomerTypeId" => MemberKind::Scalar,
            "CustomerDesc" => MemberKind::Scalar,
        ]
    }
}

entity! {
    Employee {
        name: "Employee",
        table: "employees",
        keys: ["EmployeeId"],
        members: [
            "EmployeeId" => MemberKind::Scalar,
            "FirstName" => MemberKind::Scalar,
            "LastName" => MemberKind::Scalar,
            "Country" => MemberKind::Scalar,
        ]
    }
}

entity! {
    OrderDto {
        name: "OrderDto",
        table: "order_dtos",
        keys: ["OrderId"],
        members: [
            "OrderId" => MemberKind::Scalar,
            "ShipCountry" => MemberKind::Scalar,
            "ShipRegion" => MemberKind::Scalar,
            "Freight" => MemberKind::Scalar,
            "CustomerId" => MemberKind::Scalar,
            "EmployeeId" => MemberKind::Scalar,
            "Customer" => MemberKind::reference("CustomerDto"),
            "Employee" => MemberKind::reference("EmployeeDto"),
        ]
    }
}

entity! {
    CustomerDto {
        name: "CustomerDto",
        table: "customer_dtos",
        keys: ["CustomerId"],
        members: [
            "CustomerId" => MemberKind::Scalar,
            "CompanyName" => MemberKind::Scalar,
            "ContactName" => MemberKind::Scalar,
            "Country" => MemberKind::Scalar,
            "CustomerDemographics" => MemberKind::collection("CustomerDemographic"),
        ]
    }
}

entity! {
    EmployeeDto {
        name: "EmployeeDto",
        table: "employee_dtos",
        keys: ["EmployeeId"],
        members: [
            "EmployeeId" => MemberKind::Scalar,
            "FirstName" => MemberKind::Scalar,
            "LastName" => MemberKind::Scalar,
            "Country" => MemberKind::Scalar,
        ]
    }
}

/// Registry with every sample type.
pub fn registry() -> Arc<TypeRegistry> {
    TypeRegistry::builder()
        .register::<Order>()
        .register::<Customer>()
        .register::<CustomerDemographic>()
        .register::<Employee>()
        .register::<OrderDto>()
        .register::<CustomerDto>()
        .register::<EmployeeDto>()
        .build()
}

/// Domain (`Order`, ...) to DTO (`OrderDto`, ...) mapping.
pub fn dto_mapping() -> ExpressionResult<TypeMapping> {
    TypeMapping::builder()
        .map::<Order, OrderDto>()
        .map::<Customer, CustomerDto>()
        .map::<Employee, EmployeeDto>()
        .build()
}

fn customer(id: &str, company: &str, contact: &str, country: &str) -> Customer {
    Customer {
        customer_id: id.to_string(),
        company_name: company.to_string(),
        contact_name: contact.to_string(),
        country: country.to_string(),
        customer_demographics: Some(Vec::new()),
    }
}

fn employee(id: i64, first: &str, last: &str, country: &str) -> Employee {
    Employee {
        employee_id: id,
        first_name: first.to_string(),
        last_name: last.to_string(),
        country: country.to_string(),
    }
}

pub fn customers() -> Vec<Customer> {
    let mut vinet = customer("VINET", "Vins et alcools Chevalier", "Paul Henriot", "France");
    vinet.customer_demographics = Some(vec![CustomerDemographic {
        customer_type_id: "WINE".to_string(),
        customer_desc: "Wine merchants".to_string(),
    }]);
    let mut rattc = customer("RATTC", "Rattlesnake Canyon Grocery", "Paula Wilson", "USA");
    rattc.customer_demographics = Some(vec![CustomerDemographic {
        customer_type_id: "GROCER".to_string(),
        customer_desc: "Independent grocers".to_string(),
    }]);
    vec![
        vinet,
        customer("TOMSP", "Toms Spezialitäten", "Karin Josephs", "Germany"),
        customer("VICTE", "Victuailles en stock", "Mary Saveley", "France"),
        rattc,
        customer("WHITC", "White Clover Markets", "Karl Jablonski", "USA"),
        customer("SUPRD", "Suprêmes délices", "Pascale Cartrain", "Belgium"),
    ]
}

pub fn employees() -> Vec<Employee> {
    vec![
        employee(3, "Janet", "Leverling", "USA"),
        employee(5, "Steven", "Buchanan", "UK"),
        employee(6, "Michael", "Suyama", "UK"),
        employee(8, "Laura", "Callahan", "USA"),
    ]
}

/// Orders with their customer and employee fully populated.
pub fn orders() -> Vec<Order> {
    let customers = customers();
    let employees = employees();
    let order = |id: i64,
                 country: &str,
                 region: Option<&str>,
                 freight: f64,
                 customer_id: &str,
                 employee_id: i64| Order {
        order_id: id,
        ship_country: country.to_string(),
        ship_region: region.map(str::to_string),
        freight,
        customer_id: customer_id.to_string(),
        employee_id,
        customer: customers
            .iter()
            .find(|c| c.customer_id == customer_id)
            .cloned(),
        employee: employees
            .iter()
            .find(|e| e.employee_id == employee_id)
            .cloned(),
    };
    vec![
        order(10248, "France", None, 32.38, "VINET", 5),
        order(10249, "Germany", None, 11.61, "TOMSP", 6),
        order(10251, "France", None, 41.34, "VICTE", 3),
        order(10252, "Belgium", None, 51.30, "SUPRD", 3),
        order(10262, "USA", Some("NM"), 48.29, "RATTC", 8),
        order(10269, "USA", Some("WA"), 4.56, "WHITC", 5),
    ]
}

/// The same orders as DTOs (member names line up, so serde converts them).
pub fn order_dtos() -> Vec<OrderDto> {
    orders()
        .into_iter()
        .filter_map(|o| {
            serde_json::to_value(o)
                .and_then(serde_json::from_value)
                .ok()
        })
        .collect()
}

/// In-memory data source seeded with every sample order, customer and
/// employee, in both domain and DTO form.
pub fn memory_source() -> DataSourceResult<MemoryDataSource> {
    MemoryDataSource::new(registry())
        .with_records(orders())?
        .with_records(customers())?
        .with_records(employees())?
        .with_records(order_dtos())
}

/// `x => x.ShipCountry == country`
pub fn ships_to(country: &str) -> Predicate<Order> {
    let country = country.to_string();
    Predicate::new(|x| x.field::<Order>("ShipCountry").eq(country))
}

/// `x => x.Freight >= minimum`
pub fn freight_at_least(minimum: f64) -> Predicate<Order> {
    Predicate::new(|x| x.field::<Order>("Freight").ge(minimum))
}

/// `x => x.Customer.Country == country`
pub fn customer_in(country: &str) -> Predicate<Order> {
    let country = country.to_string();
    Predicate::new(|x| {
        x.field::<Order>("Customer")
            .field::<Customer>("Country")
            .eq(country)
    })
}

/// Scalar columns of the domain tables, SQLite dialect.
pub const SQLITE_SCHEMA: &[&str] = &[
    r#"CREATE TABLE customers (
        "CustomerId" TEXT PRIMARY KEY NOT NULL,
        "CompanyName" TEXT NOT NULL,
        "ContactName" TEXT NOT NULL,
        "Country" TEXT NOT NULL
    )"#,
    r#"CREATE TABLE employees (
        "EmployeeId" INTEGER PRIMARY KEY NOT NULL,
        "FirstName" TEXT NOT NULL,
        "LastName" TEXT NOT NULL,
        "Country" TEXT NOT NULL
    )"#,
    r#"CREATE TABLE orders (
        "OrderId" INTEGER PRIMARY KEY NOT NULL,
        "ShipCountry" TEXT NOT NULL,
        "ShipRegion" TEXT,
        "Freight" REAL NOT NULL,
        "CustomerId" TEXT NOT NULL,
        "EmployeeId" INTEGER NOT NULL
    )"#,
];

async fn stage_all<T: Entity>(source: &SeaOrmDataSource, rows: Vec<T>) -> DataSourceResult<()> {
    let ty = TypeId::of::<T>();
    for row in rows {
        source.add(&ty, serde_json::to_value(row)?).await?;
    }
    Ok(())
}

/// SQLite data source with the domain schema created and the sample
/// customers, employees and orders committed. Use `sqlite::memory:` for a
/// throwaway database.
pub async fn sqlite_source(url: &str) -> AppResult<SeaOrmDataSource> {
    let config = DatabaseConfig {
        url: Some(url.to_string()),
        max_connections: Some(1),
    };
    let source = SeaOrmDataSource::connect(registry(), &config).await?;
    for ddl in SQLITE_SCHEMA {
        source
            .connection()
            .execute(Statement::from_string(DatabaseBackend::Sqlite, *ddl))
            .await?;
    }
    stage_all(&source, customers()).await?;
    stage_all(&source, employees()).await?;
    stage_all(&source, orders()).await?;
    source.commit().await?;
    Ok(source)
}
